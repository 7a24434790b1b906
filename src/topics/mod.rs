//! Topic categorization against the curated reference topic list.
//!
//! [`TopicCategorizer`] resolves free-text session topics to reference
//! topics through a [`crate::llm::CompletionModel`], memoizing every
//! outcome in a [`CacheStore`].

pub mod cache;
pub mod categorizer;
pub mod reference;

pub use cache::{CacheEntry, CacheStore, FileCacheStore, MemoryCacheStore};
pub use categorizer::{CategorizationSummary, MappingCount, TopicCategorizer};
pub use reference::{SessionType, get_reference_topics, parse_reference_topics};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse label attached to every categorization outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    NoMatch,
    InvalidResponse,
    ParseError,
    ApiError,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::NoMatch => "no_match",
            Self::InvalidResponse => "invalid_response",
            Self::ParseError => "parse_error",
            Self::ApiError => "api_error",
        }
    }

    /// Outcomes caused by a misbehaving or unreachable oracle rather than
    /// by the topic itself. These are worth asking again on a later run.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::InvalidResponse | Self::ParseError | Self::ApiError
        )
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of matching one topic. Both fields are `None` when there was
/// nothing to match (empty topic or empty reference list).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TopicMatch {
    pub matched_topic: Option<String>,
    pub confidence: Option<Confidence>,
}

impl TopicMatch {
    pub fn new(matched_topic: Option<String>, confidence: Confidence) -> Self {
        Self {
            matched_topic,
            confidence: Some(confidence),
        }
    }

    pub fn unmatched(confidence: Confidence) -> Self {
        Self::new(None, confidence)
    }
}
