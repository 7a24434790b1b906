//! Curated reference topics, published as a shared spreadsheet.

use anyhow::Result;
use chrono::{Local, NaiveDate};
use clap::ValueEnum;
use std::fmt;
use tracing::info;

use crate::errors::AnalyticsError;
use crate::fetch::{HttpClient, fetch_bytes};

pub const DEFAULT_REFERENCE_URL: &str = "https://docs.google.com/spreadsheets/d/1i5OZu7UVwcwQpYk7R8gSwvlW3FigO906etXPYG4t_Ec/export?format=csv&gid=0";

const WEEK_START_COLUMN: &str = "Week Start";
const WEEK_START_FORMAT: &str = "%Y/%m/%d";

/// Placeholder entries meaning no session ran that week.
const NO_SESSION_MARKERS: &[&str] = &["NO WONDER SESSION", "NO SEMINAR"];

/// Kind of session a form collects feedback on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SessionType {
    Seminar,
    WonderSession,
}

impl SessionType {
    /// Column of the reference sheet listing this session type's topics.
    pub fn column(self) -> &'static str {
        match self {
            Self::Seminar => "Seminar",
            Self::WonderSession => "Wonder Session",
        }
    }

    /// Short name used to prefix output files.
    pub fn slug(self) -> &'static str {
        match self {
            Self::Seminar => "seminar",
            Self::WonderSession => "wonder",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Downloads the reference sheet and returns the topics for `session_type`
/// that are in effect today.
#[tracing::instrument(skip(client), fields(session = %session_type))]
pub async fn get_reference_topics<C: HttpClient>(
    client: &C,
    url: &str,
    session_type: SessionType,
) -> Result<Vec<String>> {
    let bytes = fetch_bytes(client, url).await?;
    let today = Local::now().date_naive();
    let topics = parse_reference_topics(&bytes, session_type, today)?;

    info!(count = topics.len(), "Reference topics loaded");
    Ok(topics)
}

/// Extracts the topics for `session_type` from reference-sheet CSV bytes.
///
/// Rows whose `Week Start` is after `today` or cannot be parsed are
/// skipped, as are empty cells and no-session placeholders.
pub fn parse_reference_topics(
    csv_bytes: &[u8],
    session_type: SessionType,
    today: NaiveDate,
) -> Result<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(csv_bytes);
    let headers = rdr.headers()?.clone();

    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| AnalyticsError::MissingColumn(name.to_string()))
    };
    let week_idx = position(WEEK_START_COLUMN)?;
    let topic_idx = position(session_type.column())?;

    let mut topics = Vec::new();
    for record in rdr.records() {
        let record = record?;

        let in_effect = record
            .get(week_idx)
            .and_then(|raw| NaiveDate::parse_from_str(raw.trim(), WEEK_START_FORMAT).ok())
            .is_some_and(|start| start <= today);
        if !in_effect {
            continue;
        }

        let Some(topic) = record.get(topic_idx).map(str::trim) else {
            continue;
        };
        if topic.is_empty() || is_no_session(topic) {
            continue;
        }

        topics.push(topic.to_string());
    }

    Ok(topics)
}

fn is_no_session(topic: &str) -> bool {
    let upper = topic.to_uppercase();
    NO_SESSION_MARKERS.iter().any(|marker| upper.contains(marker))
}
