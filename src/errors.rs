use thiserror::Error;

/// Typed failures raised by the table, categorizer, and configuration layers.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("column '{0}' not found in table")]
    MissingColumn(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("malformed cache file '{path}': {reason}")]
    CacheFormat { path: String, reason: String },
}
