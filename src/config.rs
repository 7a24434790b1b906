//! Runtime settings read from the environment.
//!
//! `.env` is loaded by the binary before [`Settings::from_env`] runs, so
//! values may come from either place.

use std::path::{Path, PathBuf};

use crate::errors::AnalyticsError;
use crate::llm::openai::DEFAULT_MODEL;
use crate::topics::reference::DEFAULT_REFERENCE_URL;

pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_TOPIC_CACHE_FILE: &str = "topic_cache.json";
pub const DEFAULT_LOG_FILE_PATH: &str = "logs/feedback_analytics.log";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub service_account_file: Option<PathBuf>,
    pub form_id: Option<String>,
    pub spreadsheet_id: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: Option<String>,
    pub drive_folder_id: Option<String>,
    pub output_dir: PathBuf,
    pub topic_cache_file: PathBuf,
    pub reference_topics_url: String,
    pub log_file_path: PathBuf,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds settings from an arbitrary variable lookup. Empty values count
    /// as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Self {
            service_account_file: get("SERVICE_ACCOUNT_FILE").map(PathBuf::from),
            form_id: get("FORM_ID"),
            spreadsheet_id: get("SPREADSHEET_ID"),
            openai_api_key: get("OPENAI_API_KEY"),
            openai_model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            openai_base_url: get("OPENAI_BASE_URL"),
            drive_folder_id: get("DRIVE_FOLDER_ID"),
            output_dir: get("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            topic_cache_file: get("TOPIC_CACHE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TOPIC_CACHE_FILE)),
            reference_topics_url: get("REFERENCE_TOPICS_URL")
                .unwrap_or_else(|| DEFAULT_REFERENCE_URL.to_string()),
            log_file_path: get("LOG_FILE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE_PATH)),
        }
    }

    pub fn service_account_file(&self) -> Result<&Path, AnalyticsError> {
        self.service_account_file
            .as_deref()
            .ok_or_else(|| missing("SERVICE_ACCOUNT_FILE"))
    }

    pub fn openai_api_key(&self) -> Result<&str, AnalyticsError> {
        self.openai_api_key
            .as_deref()
            .ok_or_else(|| missing("OPENAI_API_KEY"))
    }

    pub fn form_id(&self) -> Result<&str, AnalyticsError> {
        self.form_id.as_deref().ok_or_else(|| missing("FORM_ID"))
    }

    pub fn spreadsheet_id(&self) -> Result<&str, AnalyticsError> {
        self.spreadsheet_id
            .as_deref()
            .ok_or_else(|| missing("SPREADSHEET_ID"))
    }
}

fn missing(name: &str) -> AnalyticsError {
    AnalyticsError::Configuration(format!("{name} must be set"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]);
        assert_eq!(s.output_dir, PathBuf::from("output"));
        assert_eq!(s.topic_cache_file, PathBuf::from("topic_cache.json"));
        assert_eq!(s.openai_model, "gpt-4o");
        assert_eq!(s.reference_topics_url, DEFAULT_REFERENCE_URL);
        assert_eq!(s.log_file_path, PathBuf::from("logs/feedback_analytics.log"));
        assert!(s.drive_folder_id.is_none());
        assert!(s.openai_base_url.is_none());
    }

    #[test]
    fn test_overrides() {
        let s = settings(&[
            ("OUTPUT_DIR", "/tmp/out"),
            ("OPENAI_MODEL", "gpt-4o-mini"),
            ("DRIVE_FOLDER_ID", "folder123"),
            ("FORM_ID", "form1"),
            ("OPENAI_BASE_URL", "http://localhost:8080/v1"),
        ]);
        assert_eq!(s.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(s.openai_model, "gpt-4o-mini");
        assert_eq!(s.drive_folder_id.as_deref(), Some("folder123"));
        assert_eq!(s.form_id().unwrap(), "form1");
        assert_eq!(s.openai_base_url.as_deref(), Some("http://localhost:8080/v1"));
    }

    #[test]
    fn test_blank_values_are_unset() {
        let s = settings(&[("OPENAI_API_KEY", "  "), ("OUTPUT_DIR", "")]);
        assert!(s.openai_api_key.is_none());
        assert_eq!(s.output_dir, PathBuf::from("output"));
    }

    #[test]
    fn test_missing_required_setting() {
        let err = settings(&[]).service_account_file().unwrap_err();
        assert!(matches!(err, AnalyticsError::Configuration(_)));
        assert!(err.to_string().contains("SERVICE_ACCOUNT_FILE"));
    }
}
