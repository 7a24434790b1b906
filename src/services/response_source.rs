//! Trait and types for the providers of raw survey responses.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::PathBuf;
use tracing::info;

use crate::table::Table;

/// Worksheet that linked Google Forms write their submissions to.
pub const DEFAULT_WORKSHEET: &str = "Form Responses 1";

/// Abstraction over a survey response provider (e.g., Google Sheets).
///
/// Rows are submissions and columns are the question texts.
#[async_trait::async_trait]
pub trait ResponseSource: Send + Sync {
    /// Returns every response recorded in the `worksheet` of the sheet
    /// titled `title`.
    async fn fetch_responses(&self, title: &str, worksheet: &str) -> anyhow::Result<Table>;
}

/// Reads responses from CSV exports on disk.
#[derive(Debug, Clone)]
pub enum CsvFileSource {
    /// Resolves `<dir>/<title>.csv`. The worksheet is ignored.
    Directory(PathBuf),
    /// Always reads this file.
    File(PathBuf),
}

impl CsvFileSource {
    fn path_for(&self, title: &str) -> PathBuf {
        match self {
            Self::Directory(dir) => dir.join(format!("{title}.csv")),
            Self::File(path) => path.clone(),
        }
    }
}

#[async_trait::async_trait]
impl ResponseSource for CsvFileSource {
    async fn fetch_responses(&self, title: &str, _worksheet: &str) -> Result<Table> {
        let path = self.path_for(title);
        let file = File::open(&path)
            .with_context(|| format!("Failed to open responses file '{}'", path.display()))?;
        let table = Table::from_csv_reader(file)?;

        if table.is_empty() {
            info!(title, path = %path.display(), "No responses found");
        } else {
            info!(title, responses = table.len(), "Responses loaded from CSV");
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_directory_source_resolves_title() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("Seminar Feedback.csv"),
            "Timestamp,topic\n8/14/2025 10:00:00,Rockets\n",
        )
        .unwrap();

        let source = CsvFileSource::Directory(dir.path().to_path_buf());
        let table = source
            .fetch_responses("Seminar Feedback", DEFAULT_WORKSHEET)
            .await
            .unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.columns(), &["Timestamp", "topic"]);
    }

    #[tokio::test]
    async fn test_header_only_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("responses.csv");
        fs::write(&path, "Timestamp,topic\n").unwrap();

        let table = CsvFileSource::File(path)
            .fetch_responses("ignored", DEFAULT_WORKSHEET)
            .await
            .unwrap();
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_errors() {
        let source = CsvFileSource::File(PathBuf::from("/nonexistent/responses.csv"));
        assert!(source.fetch_responses("x", DEFAULT_WORKSHEET).await.is_err());
    }
}
