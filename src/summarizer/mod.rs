//! LLM summaries of free-text feedback.
//!
//! One prompt per call, optionally seeded with expert exemplars. A failed
//! call yields an inline `Error: ...` string so one bad column never stops
//! a run.

mod few_shot;

pub use few_shot::{FewShotExample, load_few_shot_examples};

use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{info, warn};

use crate::errors::AnalyticsError;
use crate::llm::{CompletionModel, CompletionRequest};
use crate::questions::QUALITATIVE;
use crate::table::Table;

const SUMMARY_TEMPERATURE: f64 = 0.3;
const SUMMARY_MAX_TOKENS: u32 = 300;

/// Tone of the feedback being summarized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStyle {
    Positive,
    Constructive,
}

impl FromStr for FeedbackStyle {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Ok(Self::Positive),
            "constructive" => Ok(Self::Constructive),
            other => Err(AnalyticsError::Configuration(format!(
                "unknown feedback style '{other}'"
            ))),
        }
    }
}

/// Summary of one free-text column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub total_items: usize,
    pub style: FeedbackStyle,
    pub summary: String,
}

pub struct FeedbackSummarizer<M> {
    model: M,
    examples: Vec<FewShotExample>,
}

impl<M: CompletionModel> FeedbackSummarizer<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            examples: Vec::new(),
        }
    }

    pub fn with_examples(mut self, examples: Vec<FewShotExample>) -> Self {
        self.examples = examples;
        self
    }

    pub fn create_prompt(&self, texts: &[String], style: FeedbackStyle) -> String {
        let mut prompt = String::from(
            "You are modelling an expert at summarizing feedback for separate student guides \
             (teachers/educators). We want you to provide insightful but tactful feedback in two \
             forms: positive and constructive. You will summarize feedback into concise statements, \
             separated by guide and type (positive/constructive), based on provided texts, which \
             will be separate (but possibly overlapping) for positive and constructive feedback \
             statements and for each student guide.\n\n",
        );

        for (i, example) in self.examples.iter().enumerate() {
            prompt.push_str(&format!("Example {}:\n", i + 1));
            if !example.guide.is_empty() {
                prompt.push_str(&format!("Guide: {}\n", example.guide));
            }
            prompt.push_str("Texts to summarize:\n");
            for text in example.texts(style) {
                prompt.push_str(&format!("- {text}\n"));
            }
            prompt.push_str(&format!("\nExpert Summary: {}\n\n", example.summary));
        }

        prompt.push_str("Now summarize these texts:\n");
        for text in texts {
            prompt.push_str(&format!("- {text}\n"));
        }
        prompt.push_str("\nProvide a concise summary:");
        prompt
    }

    /// Summarizes `texts` in one call. Errors come back inline.
    #[tracing::instrument(skip(self, texts), fields(count = texts.len()))]
    pub async fn summarize_texts(&self, texts: &[String], style: FeedbackStyle) -> String {
        let prompt = self.create_prompt(texts, style);
        let request = CompletionRequest::new(prompt, SUMMARY_MAX_TOKENS, SUMMARY_TEMPERATURE);

        match self.model.complete(request).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "Summary request failed");
                format!("Error: {e}")
            }
        }
    }

    /// Summarizes the non-empty answers of one column.
    pub async fn summarize_column(
        &self,
        table: &Table,
        column: &str,
        style: FeedbackStyle,
    ) -> Result<ColumnSummary, AnalyticsError> {
        table.require_column(column)?;
        let texts: Vec<String> = table
            .column(column)
            .into_iter()
            .flatten()
            .filter_map(|cell| cell.key())
            .collect();

        info!(column, total = texts.len(), "Summarizing column");
        let summary = self.summarize_texts(&texts, style).await;

        Ok(ColumnSummary {
            total_items: texts.len(),
            style,
            summary,
        })
    }

    /// One summary per qualitative question present in `table`.
    pub async fn summarize_qualitative_feedback(
        &self,
        table: &Table,
    ) -> BTreeMap<String, ColumnSummary> {
        let mut summaries = BTreeMap::new();
        for &(column, style) in QUALITATIVE {
            if !table.has_column(column) {
                continue;
            }
            if let Ok(summary) = self.summarize_column(table, column, style).await {
                summaries.insert(column.to_string(), summary);
            }
        }
        summaries
    }
}
