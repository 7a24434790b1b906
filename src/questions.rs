//! Question texts of the Seminar and Wonder Session feedback forms.
//!
//! Column names in the response sheets are the literal question texts, so
//! these constants are the schema. Forms drift between versions; every
//! consumer intersects these lists with the columns actually present.

use chrono::{NaiveDate, NaiveDateTime};

use crate::summarizer::FeedbackStyle;

pub const TIMESTAMP: &str = "Timestamp";
pub const GUIDE: &str = "Guide";
pub const WEEK: &str = "week";
pub const YEAR_WEEK: &str = "year-week";
pub const WEEK_START: &str = "week_start";
pub const TOPIC: &str = "topic";
pub const MATCHED_TOPIC: &str = "matched_topic";
pub const MATCH_CONFIDENCE: &str = "match_confidence";

/// Likert questions, answered on a 1–10 scale.
pub const QUANTITATIVE: &[&str] = &[
    "I felt comfortable as a student in this Seminar.",
    "I felt like my voice mattered in this Seminar.",
    "I felt like I could connect with the Guide as a person.",
    "The content of the Seminar was interesting to me.",
    "I learned a lot from the Seminar.",
    "How much did it \"wow\" you?",
    "How much fun did you have?",
    "Did it leave you wanting to learn more about this topic?",
];

/// Questions that were asked on a 1–5 scale before [`legacy_scale_cutover`].
pub const LEGACY_SCALED: &[&str] = &[
    "I felt comfortable as a student in this Seminar.",
    "I felt like my voice mattered in this Seminar.",
    "I felt like I could connect with the Guide as a person.",
    "The content of the Seminar was interesting to me.",
];

pub const LEGACY_SCALE_FACTOR: i64 = 2;

/// Guide-name questions in priority order.
pub const GUIDE_NAME: &[&str] = &[
    "What was the name of the Guide who delivered your Seminar?",
    "What was the name of the Guide who delivered your Wonder Session?",
];

/// Free-text questions and the summary style used for each.
pub const QUALITATIVE: &[(&str, FeedbackStyle)] = &[
    (
        "What is your impression of this Guide? Feel free to use 2-4 words (or phrases) to describe them.",
        FeedbackStyle::Positive,
    ),
    (
        "What did you learn? What will stick with you from the Seminar?",
        FeedbackStyle::Positive,
    ),
    (
        "What did you find most effective or enjoyable about the Guide and the Seminar they facilitated?",
        FeedbackStyle::Positive,
    ),
    (
        "What didn't work for you about the Guide or the Seminar they facilitated? ",
        FeedbackStyle::Constructive,
    ),
    (
        "Let us know if you have more thoughts or feedback!",
        FeedbackStyle::Positive,
    ),
];

/// Responses strictly before this instant used the 1–5 scale.
pub fn legacy_scale_cutover() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 8, 13)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}
