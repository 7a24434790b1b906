//! Expert exemplars for few-shot feedback summaries.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use tracing::info;

use super::FeedbackStyle;

/// An expert-written summary with the feedback texts it was written from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FewShotExample {
    #[serde(default)]
    pub guide: String,
    #[serde(default)]
    pub positive_texts: Vec<String>,
    #[serde(default)]
    pub constructive_texts: Vec<String>,
    pub summary: String,
}

impl FewShotExample {
    pub fn texts(&self, style: FeedbackStyle) -> &[String] {
        match style {
            FeedbackStyle::Positive => &self.positive_texts,
            FeedbackStyle::Constructive => &self.constructive_texts,
        }
    }
}

#[derive(Deserialize)]
struct ExampleRow {
    guide: String,
    style: String,
    text: String,
    #[serde(default)]
    summary: String,
}

/// Loads exemplars from a `.json` file (an array of [`FewShotExample`]) or
/// a `.csv` file with `guide`, `style`, `text`, `summary` columns.
pub fn load_few_shot_examples(path: &Path) -> Result<Vec<FewShotExample>> {
    let examples = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_reader(File::open(path)?)?,
        Some("csv") => read_csv_examples(File::open(path)?)?,
        _ => {
            return Err(anyhow::anyhow!(
                "Unsupported few-shot example file '{}': expected .json or .csv",
                path.display()
            ));
        }
    };

    info!(path = %path.display(), count = examples.len(), "Few-shot examples loaded");
    Ok(examples)
}

/// Groups CSV rows into one exemplar per guide, in first-seen order. The
/// first non-empty summary of a guide wins.
fn read_csv_examples<R: std::io::Read>(reader: R) -> Result<Vec<FewShotExample>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut examples: Vec<FewShotExample> = Vec::new();
    let mut by_guide: HashMap<String, usize> = HashMap::new();

    for result in rdr.deserialize() {
        let row: ExampleRow = result?;
        let style: FeedbackStyle = row.style.parse()?;

        let slot = *by_guide.entry(row.guide.clone()).or_insert_with(|| {
            examples.push(FewShotExample {
                guide: row.guide.clone(),
                ..Default::default()
            });
            examples.len() - 1
        });
        let example = &mut examples[slot];

        let text = row.text.trim();
        if !text.is_empty() {
            match style {
                FeedbackStyle::Positive => example.positive_texts.push(text.to_string()),
                FeedbackStyle::Constructive => example.constructive_texts.push(text.to_string()),
            }
        }
        if example.summary.is_empty() && !row.summary.trim().is_empty() {
            example.summary = row.summary.trim().to_string();
        }
    }

    Ok(examples)
}
