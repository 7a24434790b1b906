use async_trait::async_trait;
use chrono::NaiveDate;
use feedback_analytics::llm::{CompletionModel, CompletionRequest};
use feedback_analytics::pipeline::analyze_session;
use feedback_analytics::services::{CsvFileSource, ResponseSource};
use feedback_analytics::summarizer::FeedbackSummarizer;
use feedback_analytics::table::{Cell, Table};
use feedback_analytics::topics::{
    CacheStore, FileCacheStore, MemoryCacheStore, SessionType, TopicCategorizer,
    parse_reference_topics,
};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const COMFORT: &str = "I felt comfortable as a student in this Seminar.";
const LEARNED: &str = "What did you learn? What will stick with you from the Seminar?";

/// Answers categorization prompts from a fixed topic -> reply table and
/// counts every call.
#[derive(Clone)]
struct FakeModel {
    replies: HashMap<String, String>,
    calls: Arc<AtomicUsize>,
}

impl FakeModel {
    fn new(replies: &[(&str, &str)]) -> Self {
        Self {
            replies: replies
                .iter()
                .map(|(t, r)| (t.to_string(), r.to_string()))
                .collect(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionModel for FakeModel {
    async fn complete(&self, request: CompletionRequest) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let topic = request
            .prompt
            .split("Topic to categorize: '")
            .nth(1)
            .and_then(|rest| rest.split('\'').next())
            .unwrap_or_default();
        Ok(self
            .replies
            .get(topic)
            .cloned()
            .unwrap_or_else(|| "summary of feedback".to_string()))
    }
}

fn fixture(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn seminar_model() -> FakeModel {
    FakeModel::new(&[
        ("rockets", "1"),
        ("Rockets!", "1"),
        ("bridges", "2"),
        ("mystery", "0"),
    ])
}

fn reference_topics() -> Vec<String> {
    let bytes = fs::read(fixture("reference_topics.csv")).unwrap();
    let today = NaiveDate::from_ymd_opt(2025, 9, 22).unwrap();
    parse_reference_topics(&bytes, SessionType::Seminar, today).unwrap()
}

async fn load_responses() -> Table {
    CsvFileSource::File(fixture("seminar_responses.csv"))
        .fetch_responses("Seminar Feedback (Responses)", "Form Responses 1")
        .await
        .unwrap()
}

fn read_table(path: &Path) -> Table {
    Table::from_csv_reader(fs::File::open(path).unwrap()).unwrap()
}

fn column(table: &Table, name: &str) -> Vec<Cell> {
    table.column(name).unwrap().cloned().collect()
}

#[test]
fn test_reference_fixture() {
    assert_eq!(reference_topics(), vec!["Space Exploration", "Engineering"]);
}

#[tokio::test]
async fn test_full_pipeline() {
    let out = tempfile::tempdir().unwrap();
    let model = seminar_model();
    let mut categorizer = TopicCategorizer::new(model.clone(), MemoryCacheStore::new());
    let summarizer = FeedbackSummarizer::new(model.clone());

    let report = analyze_session(
        load_responses().await,
        SessionType::Seminar,
        &reference_topics(),
        &mut categorizer,
        Some(&summarizer),
        "topic",
        out.path(),
    )
    .await
    .unwrap();

    assert_eq!(report.responses, 5);
    assert_eq!(report.files.len(), 10);
    assert!(report.files.iter().all(|f| f.exists()));

    // One call per distinct topic, one for the single qualitative column.
    assert_eq!(model.calls(), 5);

    let summary = &report.categorization;
    assert_eq!(summary.total_unique_topics, 4);
    assert_eq!(summary.total_unique_matched_topics, 2);
    assert_eq!(summary.unmatched_entries, 1);
    assert_eq!(summary.unmatched_topics, vec!["mystery"]);

    let guide_stats = fs::read_to_string(out.path().join("seminar_guide_stats.csv")).unwrap();
    let lines: Vec<_> = guide_stats.lines().collect();
    assert_eq!(
        lines[0],
        format!("Guide,{COMFORT},How much fun did you have?,mean_overall,Count")
    );
    assert_eq!(lines[1], "Ada,7,9.5,8.25,2");
    assert_eq!(lines[2], "Grace,8,7,7.5,2");
    assert_eq!(lines[3], ",5,,5,1");

    let week_stats = fs::read_to_string(out.path().join("seminar_week_stats.csv")).unwrap();
    let weeks: Vec<_> = week_stats
        .lines()
        .skip(1)
        .map(|l| l.split(',').next().unwrap())
        .collect();
    assert_eq!(weeks, vec!["2025-09-01", "2025-08-18", "2025-08-11"]);

    let summaries: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(out.path().join("seminar_qualitative_summaries.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(summaries[LEARNED]["total_items"], 3);
    assert_eq!(summaries[LEARNED]["summary"], "summary of feedback");
}

#[tokio::test]
async fn test_clean_responses_file() {
    let out = tempfile::tempdir().unwrap();
    let mut categorizer = TopicCategorizer::new(seminar_model(), MemoryCacheStore::new());

    analyze_session(
        load_responses().await,
        SessionType::Seminar,
        &reference_topics(),
        &mut categorizer,
        None::<&FeedbackSummarizer<FakeModel>>,
        "topic",
        out.path(),
    )
    .await
    .unwrap();

    assert!(!out.path().join("seminar_qualitative_summaries.json").exists());

    let clean = read_table(&out.path().join("seminar_responses_clean.csv"));
    assert!(!clean.has_column("Anything else?"));

    // Pre-cutover 3 is rescaled, post-cutover 8 is not.
    let comfort = column(&clean, COMFORT);
    assert_eq!(comfort[0], Cell::text("6"));
    assert_eq!(comfort[1], Cell::text("8"));

    assert_eq!(column(&clean, "week")[1], Cell::text("33"));
    assert_eq!(column(&clean, "week_start")[1], Cell::text("2025-08-11"));
    assert_eq!(column(&clean, "Guide")[4], Cell::text(""));

    let matched = column(&clean, "matched_topic");
    assert_eq!(matched[0], Cell::text("Space Exploration"));
    assert_eq!(matched[2], Cell::text("Engineering"));
    assert_eq!(matched[4], Cell::text(""));
    assert_eq!(column(&clean, "match_confidence")[4], Cell::text("no_match"));
}

#[tokio::test]
async fn test_warm_file_cache_skips_model() {
    let out = tempfile::tempdir().unwrap();
    let cache_path = out.path().join("cache").join("topic_cache.json");

    let first = seminar_model();
    let mut categorizer =
        TopicCategorizer::new(first.clone(), FileCacheStore::load(&cache_path, true));
    analyze_session(
        load_responses().await,
        SessionType::Seminar,
        &reference_topics(),
        &mut categorizer,
        None::<&FeedbackSummarizer<FakeModel>>,
        "topic",
        out.path(),
    )
    .await
    .unwrap();
    assert_eq!(first.calls(), 4);

    // Reference order does not affect the cache key.
    let mut reversed = reference_topics();
    reversed.reverse();

    let second = seminar_model();
    let store = FileCacheStore::load(&cache_path, true);
    assert_eq!(store.len(), 4);
    let mut categorizer = TopicCategorizer::new(second.clone(), store);
    let report = analyze_session(
        load_responses().await,
        SessionType::Seminar,
        &reversed,
        &mut categorizer,
        None::<&FeedbackSummarizer<FakeModel>>,
        "topic",
        out.path(),
    )
    .await
    .unwrap();

    assert_eq!(second.calls(), 0);
    assert_eq!(report.categorization.unmatched_entries, 1);
}

#[tokio::test]
async fn test_empty_source_still_writes_outputs() {
    let out = tempfile::tempdir().unwrap();
    let model = seminar_model();
    let mut categorizer = TopicCategorizer::new(model.clone(), MemoryCacheStore::new());

    let report = analyze_session(
        Table::default(),
        SessionType::WonderSession,
        &reference_topics(),
        &mut categorizer,
        None::<&FeedbackSummarizer<FakeModel>>,
        "topic",
        out.path(),
    )
    .await
    .unwrap();

    assert_eq!(report.responses, 0);
    assert_eq!(model.calls(), 0);
    assert!(out.path().join("wonder_guide_stats.csv").exists());
    assert_eq!(report.categorization.total_unique_topics, 0);
}
