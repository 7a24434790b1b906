use anyhow::Result;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use super::cache::{CacheEntry, CacheStore, cache_key};
use super::{Confidence, TopicMatch};
use crate::llm::{CompletionModel, CompletionRequest};
use crate::questions::{MATCH_CONFIDENCE, MATCHED_TOPIC};
use crate::table::{Cell, Table};

const MATCH_TEMPERATURE: f64 = 0.1;
const MATCH_MAX_TOKENS: u32 = 10;

/// Reference sets at most this large yield `high` confidence matches.
const HIGH_CONFIDENCE_MAX_CANDIDATES: usize = 10;

/// Resolves free-text topics to a closed reference vocabulary.
pub struct TopicCategorizer<M, S> {
    model: M,
    store: S,
}

/// Row count for one (topic, matched topic) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingCount {
    pub topic: Option<String>,
    pub matched_topic: Option<String>,
    pub count: usize,
}

/// Aggregate view of a categorized table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorizationSummary {
    pub total_unique_topics: usize,
    pub total_unique_matched_topics: usize,
    pub unmatched_entries: usize,
    pub unmatched_topics: Vec<String>,
    pub mapping_details: Vec<MappingCount>,
}

impl<M: CompletionModel, S: CacheStore> TopicCategorizer<M, S> {
    pub fn new(model: M, store: S) -> Self {
        Self { model, store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Finds the reference topic closest to `topic`.
    ///
    /// Cached outcomes are returned without consulting the model. Every
    /// fresh outcome, failures included, is written back to the store.
    #[tracing::instrument(skip(self, reference_topics), fields(references = reference_topics.len()))]
    pub async fn find_closest_topic(
        &mut self,
        topic: &str,
        reference_topics: &[String],
    ) -> TopicMatch {
        if topic.trim().is_empty() || reference_topics.is_empty() {
            return TopicMatch::default();
        }

        let key = cache_key(topic, reference_topics);
        if let Some(entry) = self.store.get(&key) {
            debug!(confidence = %entry.confidence, "Cache hit");
            return entry.to_match();
        }

        let prompt = categorization_prompt(topic, reference_topics);
        let request = CompletionRequest::new(prompt, MATCH_MAX_TOKENS, MATCH_TEMPERATURE);
        let outcome = match self.model.complete(request).await {
            Ok(reply) => interpret_reply(&reply, reference_topics),
            Err(e) => {
                warn!(error = %e, "Topic categorization request failed");
                TopicMatch::unmatched(Confidence::ApiError)
            }
        };

        if let Some(confidence) = outcome.confidence {
            let entry = CacheEntry {
                topic: topic.to_string(),
                matched_topic: outcome.matched_topic.clone(),
                confidence,
            };
            if let Err(e) = self.store.put(key, entry) {
                warn!(error = %e, "Could not save topic cache");
            }
            info!(
                matched = outcome.matched_topic.as_deref().unwrap_or("-"),
                confidence = %confidence,
                "Topic categorized"
            );
        }

        outcome
    }

    /// Adds `matched_topic` and `match_confidence` columns to `table`.
    ///
    /// The model is consulted once per distinct topic value; the result is
    /// broadcast to every row carrying that value.
    #[tracing::instrument(skip(self, table, reference_topics), fields(rows = table.len()))]
    pub async fn categorize_table_topics(
        &mut self,
        mut table: Table,
        reference_topics: &[String],
        topic_column: &str,
    ) -> Result<Table> {
        let idx = table.require_column(topic_column)?;

        let mut unique: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for row in table.rows() {
            if let Some(topic) = row[idx].key() {
                if seen.insert(topic.clone()) {
                    unique.push(topic);
                }
            }
        }

        info!(unique_topics = unique.len(), "Categorizing topics");

        let mut mapping: HashMap<String, TopicMatch> = HashMap::with_capacity(unique.len());
        for (i, topic) in unique.into_iter().enumerate() {
            debug!(position = i + 1, topic = %topic, "Processing topic");
            let outcome = self.find_closest_topic(&topic, reference_topics).await;
            mapping.insert(topic, outcome);
        }

        let (matched, confidence): (Vec<Cell>, Vec<Cell>) = table
            .rows()
            .iter()
            .map(|row| {
                match row[idx].key().and_then(|topic| mapping.get(&topic)) {
                    Some(outcome) => (
                        Cell::from_option(outcome.matched_topic.clone()),
                        Cell::from_option(outcome.confidence.map(|c| c.to_string())),
                    ),
                    None => (Cell::Missing, Cell::Missing),
                }
            })
            .unzip();

        table.set_column(MATCHED_TOPIC, matched);
        table.set_column(MATCH_CONFIDENCE, confidence);
        Ok(table)
    }
}

/// Builds the numbered-list prompt asking for the best match's position.
pub fn categorization_prompt(topic: &str, reference_topics: &[String]) -> String {
    let mut prompt = String::from(
        "You are an expert at categorizing and matching topics. \
         Given a topic and a list of reference topics, find the closest semantic match. \
         Consider synonyms, related concepts, and broader/narrower topic relationships.\n\n",
    );
    prompt.push_str(&format!("Topic to categorize: '{topic}'\n\n"));
    prompt.push_str("Reference topics to match against:\n");
    for (i, reference) in reference_topics.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, reference));
    }
    prompt.push_str(
        "\nPlease respond with only the number (1, 2, 3, etc.) of the closest matching reference topic. \
         If no reasonable match exists, respond with '0'.\n\nNumber:",
    );
    prompt
}

/// Maps the model's reply onto a [`TopicMatch`].
pub fn interpret_reply(reply: &str, reference_topics: &[String]) -> TopicMatch {
    let Ok(index) = reply.trim().parse::<i64>() else {
        return TopicMatch::unmatched(Confidence::ParseError);
    };

    match usize::try_from(index) {
        Ok(0) => TopicMatch::unmatched(Confidence::NoMatch),
        Ok(n) if n <= reference_topics.len() => {
            let confidence = if reference_topics.len() <= HIGH_CONFIDENCE_MAX_CANDIDATES {
                Confidence::High
            } else {
                Confidence::Medium
            };
            TopicMatch::new(Some(reference_topics[n - 1].clone()), confidence)
        }
        _ => TopicMatch::unmatched(Confidence::InvalidResponse),
    }
}

/// Summarizes how the topics in `table` were categorized.
pub fn categorization_summary(table: &Table, topic_column: &str) -> Result<CategorizationSummary> {
    let topic_idx = table.require_column(topic_column)?;
    let matched_idx = table.require_column(MATCHED_TOPIC)?;

    let mut topics = HashSet::new();
    let mut matched_topics = HashSet::new();
    let mut unmatched_entries = 0;
    let mut unmatched_topics: Vec<String> = Vec::new();
    let mut counts: HashMap<(Option<String>, Option<String>), usize> = HashMap::new();

    for row in table.rows() {
        let topic = row[topic_idx].key();
        let matched = row[matched_idx].key();

        if let Some(m) = &matched {
            matched_topics.insert(m.clone());
        }
        if let Some(t) = &topic {
            topics.insert(t.clone());
            if matched.is_none() {
                unmatched_entries += 1;
                if !unmatched_topics.contains(t) {
                    unmatched_topics.push(t.clone());
                }
            }
        }

        *counts.entry((topic, matched)).or_default() += 1;
    }

    let mut mapping_details: Vec<MappingCount> = counts
        .into_iter()
        .map(|((topic, matched_topic), count)| MappingCount {
            topic,
            matched_topic,
            count,
        })
        .collect();
    mapping_details.sort_by(|a, b| {
        missing_last(&a.topic, &b.topic).then_with(|| missing_last(&a.matched_topic, &b.matched_topic))
    });

    if unmatched_topics.is_empty() {
        info!("All topics were matched");
    } else {
        let mut sorted = unmatched_topics.clone();
        sorted.sort();
        warn!(count = sorted.len(), topics = ?sorted, "Unmatched topics");
    }
    info!(
        unmatched_entries,
        total_topics = topics.len(),
        "Categorization summary"
    );

    Ok(CategorizationSummary {
        total_unique_topics: topics.len(),
        total_unique_matched_topics: matched_topics.len(),
        unmatched_entries,
        unmatched_topics,
        mapping_details,
    })
}

fn missing_last(a: &Option<String>, b: &Option<String>) -> std::cmp::Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topics::MemoryCacheStore;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies from a script and records every prompt it sees.
    struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String, String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(replies: &[Result<&str, &str>]) -> Self {
            Self {
                replies: Mutex::new(
                    replies
                        .iter()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl<'a> CompletionModel for &'a ScriptedModel {
        async fn complete(&self, request: CompletionRequest) -> Result<String> {
            self.prompts.lock().unwrap().push(request.prompt);
            match self.replies.lock().unwrap().pop_front() {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(e)) => Err(anyhow::anyhow!(e)),
                None => Err(anyhow::anyhow!("script exhausted")),
            }
        }
    }

    fn refs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn topic_table(rows: &[(&str, &str)]) -> Table {
        Table::from_strings(
            vec!["topic".into(), "Guide".into()],
            rows.iter()
                .map(|(t, g)| vec![t.to_string(), g.to_string()])
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_match_within_range_small_set_is_high() {
        let model = ScriptedModel::new(&[Ok("2")]);
        let mut categorizer = TopicCategorizer::new(&model, MemoryCacheStore::new());

        let result = categorizer
            .find_closest_topic("Rockets", &refs(&["Art", "Space Exploration"]))
            .await;

        assert_eq!(result.matched_topic.as_deref(), Some("Space Exploration"));
        assert_eq!(result.confidence, Some(Confidence::High));
    }

    #[tokio::test]
    async fn test_match_in_large_set_is_medium() {
        let references: Vec<String> = (1..=11).map(|i| format!("Topic {i}")).collect();
        let model = ScriptedModel::new(&[Ok("11")]);
        let mut categorizer = TopicCategorizer::new(&model, MemoryCacheStore::new());

        let result = categorizer.find_closest_topic("x", &references).await;
        assert_eq!(result.matched_topic.as_deref(), Some("Topic 11"));
        assert_eq!(result.confidence, Some(Confidence::Medium));
    }

    #[test]
    fn test_interpret_reply_tiers() {
        let r = refs(&["A", "B"]);
        assert_eq!(interpret_reply("0", &r), TopicMatch::unmatched(Confidence::NoMatch));
        assert_eq!(interpret_reply("3", &r), TopicMatch::unmatched(Confidence::InvalidResponse));
        assert_eq!(interpret_reply("-1", &r), TopicMatch::unmatched(Confidence::InvalidResponse));
        assert_eq!(interpret_reply("two", &r), TopicMatch::unmatched(Confidence::ParseError));
        assert_eq!(interpret_reply("1.", &r), TopicMatch::unmatched(Confidence::ParseError));
        assert_eq!(
            interpret_reply(" 1\n", &r),
            TopicMatch::new(Some("A".into()), Confidence::High)
        );
    }

    #[tokio::test]
    async fn test_api_error_is_cached() {
        let model = ScriptedModel::new(&[Err("connection reset")]);
        let mut categorizer = TopicCategorizer::new(&model, MemoryCacheStore::new());
        let r = refs(&["Art"]);

        let first = categorizer.find_closest_topic("Paint", &r).await;
        let second = categorizer.find_closest_topic("Paint", &r).await;

        assert_eq!(first, TopicMatch::unmatched(Confidence::ApiError));
        assert_eq!(first, second);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_topic_short_circuits() {
        let model = ScriptedModel::new(&[]);
        let mut categorizer = TopicCategorizer::new(&model, MemoryCacheStore::new());

        let result = categorizer.find_closest_topic("  ", &refs(&["Art"])).await;
        assert_eq!(result, TopicMatch::default());
        assert_eq!(model.calls(), 0);
        assert!(categorizer.store().is_empty());
    }

    #[tokio::test]
    async fn test_warm_cache_ignores_reference_order() {
        let model = ScriptedModel::new(&[Ok("1")]);
        let mut categorizer = TopicCategorizer::new(&model, MemoryCacheStore::new());

        let first = categorizer
            .find_closest_topic("Stars", &refs(&["Astronomy", "Cooking"]))
            .await;
        let second = categorizer
            .find_closest_topic("Stars", &refs(&["Cooking", "Astronomy"]))
            .await;

        assert_eq!(first, second);
        assert_eq!(first.matched_topic.as_deref(), Some("Astronomy"));
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_prompt_lists_references_in_given_order() {
        let model = ScriptedModel::new(&[Ok("0")]);
        let mut categorizer = TopicCategorizer::new(&model, MemoryCacheStore::new());
        categorizer
            .find_closest_topic("Baking", &refs(&["Zoology", "Art"]))
            .await;

        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].contains("Topic to categorize: 'Baking'"));
        assert!(prompts[0].contains("1. Zoology\n2. Art\n"));
        assert!(prompts[0].ends_with("Number:"));
    }

    #[tokio::test]
    async fn test_categorize_calls_model_once_per_distinct_topic() {
        let model = ScriptedModel::new(&[Ok("1"), Ok("0")]);
        let mut categorizer = TopicCategorizer::new(&model, MemoryCacheStore::new());
        let table = topic_table(&[
            ("Rockets", "A"),
            ("Baking", "B"),
            ("Rockets", "C"),
            ("Rockets", "D"),
        ]);

        let categorized = categorizer
            .categorize_table_topics(table, &refs(&["Space"]), "topic")
            .await
            .unwrap();

        assert_eq!(model.calls(), 2);
        let matched: Vec<_> = categorized.column(MATCHED_TOPIC).unwrap().cloned().collect();
        assert_eq!(
            matched,
            vec![
                Cell::text("Space"),
                Cell::Missing,
                Cell::text("Space"),
                Cell::text("Space")
            ]
        );
        let tiers: Vec<_> = categorized.column(MATCH_CONFIDENCE).unwrap().cloned().collect();
        assert_eq!(tiers[1], Cell::text("no_match"));
        assert_eq!(tiers[3], Cell::text("high"));
    }

    #[tokio::test]
    async fn test_case_variants_are_queried_independently() {
        let model = ScriptedModel::new(&[Ok("1"), Ok("1")]);
        let mut categorizer = TopicCategorizer::new(&model, MemoryCacheStore::new());
        let table = topic_table(&[("Space", "A"), ("space", "B")]);

        categorizer
            .categorize_table_topics(table, &refs(&["Space Exploration"]), "topic")
            .await
            .unwrap();

        assert_eq!(model.calls(), 2);
        assert_eq!(categorizer.store().len(), 2);
    }

    #[tokio::test]
    async fn test_categorize_requires_topic_column() {
        let model = ScriptedModel::new(&[]);
        let mut categorizer = TopicCategorizer::new(&model, MemoryCacheStore::new());
        let table = topic_table(&[("Space", "A")]);

        let err = categorizer
            .categorize_table_topics(table, &refs(&["Space"]), "Session topic")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Session topic"));
    }

    #[tokio::test]
    async fn test_missing_topic_rows_stay_unmatched() {
        let model = ScriptedModel::new(&[Ok("1")]);
        let mut categorizer = TopicCategorizer::new(&model, MemoryCacheStore::new());
        let mut table = topic_table(&[("Space", "A"), ("", "B")]);
        table.map_column("topic", |c| match c {
            Cell::Text(s) if s.is_empty() => Cell::Missing,
            other => other.clone(),
        });

        let categorized = categorizer
            .categorize_table_topics(table, &refs(&["Space"]), "topic")
            .await
            .unwrap();
        let tiers: Vec<_> = categorized.column(MATCH_CONFIDENCE).unwrap().cloned().collect();
        assert_eq!(tiers, vec![Cell::text("high"), Cell::Missing]);
    }

    #[tokio::test]
    async fn test_summary_fully_matched_has_no_unmatched_entries() {
        let model = ScriptedModel::new(&[Ok("1"), Ok("1")]);
        let mut categorizer = TopicCategorizer::new(&model, MemoryCacheStore::new());
        let table = topic_table(&[("Rockets", "A"), ("Planets", "B"), ("Rockets", "C")]);

        let categorized = categorizer
            .categorize_table_topics(table, &refs(&["Space"]), "topic")
            .await
            .unwrap();
        let summary = categorization_summary(&categorized, "topic").unwrap();

        assert_eq!(summary.unmatched_entries, 0);
        assert!(summary.unmatched_topics.is_empty());
        assert_eq!(summary.total_unique_topics, 2);
        assert_eq!(summary.total_unique_matched_topics, 1);
        assert_eq!(
            summary.mapping_details,
            vec![
                MappingCount {
                    topic: Some("Planets".into()),
                    matched_topic: Some("Space".into()),
                    count: 1
                },
                MappingCount {
                    topic: Some("Rockets".into()),
                    matched_topic: Some("Space".into()),
                    count: 2
                },
            ]
        );
    }

    #[test]
    fn test_summary_counts_unmatched_rows() {
        let mut table = topic_table(&[("Knitting", "A"), ("Knitting", "B"), ("Rockets", "C")]);
        table.set_column(
            MATCHED_TOPIC,
            vec![Cell::Missing, Cell::Missing, Cell::text("Space")],
        );

        let summary = categorization_summary(&table, "topic").unwrap();
        assert_eq!(summary.unmatched_entries, 2);
        assert_eq!(summary.unmatched_topics, vec!["Knitting".to_string()]);
    }

    #[test]
    fn test_summary_requires_matched_column() {
        let table = topic_table(&[("Rockets", "A")]);
        assert!(categorization_summary(&table, "topic").is_err());
    }
}
