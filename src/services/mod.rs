pub mod response_source;

pub use response_source::{CsvFileSource, ResponseSource};
