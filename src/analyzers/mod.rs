//! Aggregate statistics over cleaned and categorized responses.
//!
//! Responses are grouped by guide, week, topic, or topic and guide. Each
//! group gets the mean of every quantitative question present, a mean of
//! those means, and a row count. Pairwise correlations between questions
//! are computed separately.

pub mod aggregate;
pub mod correlation;
pub mod types;
pub mod utility;

pub use aggregate::{
    guide_level_summary, topic_guide_level_summary, topic_level_summary, week_level_summary,
};
pub use correlation::correlation_analysis;
pub use types::{CorrelationMatrix, GroupSummary, SummaryTable};
