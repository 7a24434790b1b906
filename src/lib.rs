pub mod analyzers;
pub mod cleaner;
pub mod config;
pub mod errors;
pub mod fetch;
pub mod google;
pub mod llm;
pub mod output;
pub mod pipeline;
pub mod questions;
pub mod services;
pub mod summarizer;
pub mod table;
pub mod topics;
