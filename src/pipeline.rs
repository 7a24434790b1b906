//! One session type's pass through the pipeline: clean, categorize,
//! aggregate, summarize and write the output files.

use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::analyzers::{
    correlation_analysis, guide_level_summary, topic_guide_level_summary, topic_level_summary,
    week_level_summary,
};
use crate::cleaner::clean_responses;
use crate::llm::CompletionModel;
use crate::output::{
    output_path, write_correlation_matrix, write_json, write_mapping_details, write_summary_table,
    write_table, write_table_xlsx,
};
use crate::summarizer::FeedbackSummarizer;
use crate::table::{Cell, Table};
use crate::topics::categorizer::categorization_summary;
use crate::topics::{CacheStore, CategorizationSummary, SessionType, TopicCategorizer};

/// What one session type's analysis produced.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session: String,
    pub responses: usize,
    pub categorization: CategorizationSummary,
    pub files: Vec<PathBuf>,
}

/// Runs the analysis for `session` over its raw responses and writes every
/// output file under `output_dir` with the session's prefix.
///
/// A table without `topic_column` is analyzed with every topic missing.
#[tracing::instrument(
    skip(raw, session, reference_topics, categorizer, summarizer, output_dir),
    fields(session = %session, rows = raw.len())
)]
pub async fn analyze_session<M, S, Q>(
    raw: Table,
    session: SessionType,
    reference_topics: &[String],
    categorizer: &mut TopicCategorizer<M, S>,
    summarizer: Option<&FeedbackSummarizer<Q>>,
    topic_column: &str,
    output_dir: &Path,
) -> Result<SessionReport>
where
    M: CompletionModel,
    S: CacheStore,
    Q: CompletionModel,
{
    let mut table = clean_responses(raw);
    if !table.has_column(topic_column) {
        warn!(topic_column, "Topic column not present, topics treated as missing");
        table.set_column(topic_column, vec![Cell::Missing; table.len()]);
    }

    let table = categorizer
        .categorize_table_topics(table, reference_topics, topic_column)
        .await?;
    let categorization = categorization_summary(&table, topic_column)?;

    let prefix = session.slug();
    let path = |name: &str| output_path(output_dir, prefix, name);
    let mut files = Vec::new();

    for (name, summary) in [
        ("guide_stats.csv", guide_level_summary(&table)?),
        ("week_stats.csv", week_level_summary(&table)?),
        ("topic_stats.csv", topic_level_summary(&table)?),
        ("topic_guide_stats.csv", topic_guide_level_summary(&table)?),
    ] {
        let file = path(name);
        write_summary_table(&file, &summary)?;
        files.push(file);
    }

    let file = path("correlations.csv");
    write_correlation_matrix(&file, &correlation_analysis(&table))?;
    files.push(file);

    let file = path("topic_mapping.csv");
    write_mapping_details(&file, &categorization.mapping_details)?;
    files.push(file);

    let file = path("responses_clean.csv");
    write_table(&file, &table)?;
    files.push(file);

    let file = path("responses_clean.xlsx");
    write_table_xlsx(&file, &table)?;
    files.push(file);

    let file = path("categorization_summary.json");
    write_json(&file, &categorization)?;
    files.push(file);

    if let Some(summarizer) = summarizer {
        let summaries = summarizer.summarize_qualitative_feedback(&table).await;
        let file = path("qualitative_summaries.json");
        write_json(&file, &summaries)?;
        files.push(file);
    }

    info!(
        responses = table.len(),
        unmatched_entries = categorization.unmatched_entries,
        files = files.len(),
        "Session analyzed"
    );

    Ok(SessionReport {
        session: session.to_string(),
        responses: table.len(),
        categorization,
        files,
    })
}
