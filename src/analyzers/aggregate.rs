use crate::analyzers::types::{GroupSummary, SummaryTable};
use crate::analyzers::utility::mean;
use crate::questions::{GUIDE, MATCHED_TOPIC, QUANTITATIVE, WEEK_START};
use crate::table::Table;
use anyhow::Result;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

/// Per-guide summary, best rated first. Responses without a guide form
/// their own group.
pub fn guide_level_summary(table: &Table) -> Result<SummaryTable> {
    let mut summary = summarize_by(table, &[GUIDE])?;
    sort_by_overall(&mut summary);
    Ok(summary)
}

/// Per-week summary keyed by the Monday of each week, most recent first.
pub fn week_level_summary(table: &Table) -> Result<SummaryTable> {
    let mut summary = summarize_by(table, &[WEEK_START])?;
    summary
        .groups
        .sort_by(|a, b| missing_last(&a.key[0], &b.key[0], |x, y| y.cmp(x)));
    Ok(summary)
}

/// Per-matched-topic summary, best rated first.
pub fn topic_level_summary(table: &Table) -> Result<SummaryTable> {
    let mut summary = summarize_by(table, &[MATCHED_TOPIC])?;
    sort_by_overall(&mut summary);
    Ok(summary)
}

/// Per (matched topic, guide) summary, best rated first.
pub fn topic_guide_level_summary(table: &Table) -> Result<SummaryTable> {
    let mut summary = summarize_by(table, &[MATCHED_TOPIC, GUIDE])?;
    sort_by_overall(&mut summary);
    Ok(summary)
}

#[derive(Default)]
struct Accumulator {
    sums: Vec<f64>,
    counts: Vec<usize>,
    rows: usize,
}

/// Groups `table` by `key_columns` and computes the question means of every
/// group. Groups come back ordered by key, missing keys last.
pub fn summarize_by(table: &Table, key_columns: &[&str]) -> Result<SummaryTable> {
    let key_idx = key_columns
        .iter()
        .map(|name| table.require_column(name))
        .collect::<Result<Vec<_>, _>>()?;

    let questions = table.present_columns(QUANTITATIVE);
    let question_idx: Vec<usize> = questions
        .iter()
        .filter_map(|q| table.column_index(q))
        .collect();

    let mut order: Vec<Vec<Option<String>>> = Vec::new();
    let mut groups: HashMap<Vec<Option<String>>, Accumulator> = HashMap::new();

    for row in table.rows() {
        let key: Vec<Option<String>> = key_idx.iter().map(|&i| row[i].key()).collect();
        let acc = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            Accumulator {
                sums: vec![0.0; question_idx.len()],
                counts: vec![0; question_idx.len()],
                rows: 0,
            }
        });

        acc.rows += 1;
        for (slot, &i) in question_idx.iter().enumerate() {
            if let Some(value) = row[i].as_int() {
                acc.sums[slot] += value as f64;
                acc.counts[slot] += 1;
            }
        }
    }

    order.sort_by(|a, b| {
        a.iter()
            .zip(b)
            .map(|(x, y)| missing_last(x, y, |x, y| x.cmp(y)))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    });

    let summaries: Vec<GroupSummary> = order
        .into_iter()
        .map(|key| {
            let acc = &groups[&key];
            let means: Vec<Option<f64>> = acc
                .sums
                .iter()
                .zip(&acc.counts)
                .map(|(&sum, &n)| (n > 0).then(|| sum / n as f64))
                .collect();
            let present: Vec<f64> = means.iter().flatten().copied().collect();

            GroupSummary {
                key,
                mean_overall: mean(&present),
                means,
                count: acc.rows,
            }
        })
        .collect();

    debug!(
        keys = ?key_columns,
        groups = summaries.len(),
        questions = questions.len(),
        "Summary computed"
    );

    Ok(SummaryTable {
        key_columns: key_columns.iter().map(|k| k.to_string()).collect(),
        questions,
        groups: summaries,
    })
}

fn sort_by_overall(summary: &mut SummaryTable) {
    summary.groups.sort_by(|a, b| {
        missing_last(&a.mean_overall, &b.mean_overall, |x, y| {
            y.partial_cmp(x).unwrap_or(Ordering::Equal)
        })
    });
}

fn missing_last<T>(a: &Option<T>, b: &Option<T>, cmp: impl Fn(&T, &T) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => cmp(a, b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
