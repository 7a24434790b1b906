//! Data types produced by the aggregation pipeline.

use serde::Serialize;

/// Statistics for one group of responses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    /// One value per grouping column; `None` groups the missing values.
    pub key: Vec<Option<String>>,
    /// Mean per quantitative question, aligned with [`SummaryTable::questions`].
    pub means: Vec<Option<f64>>,
    /// Mean of the non-missing question means.
    pub mean_overall: Option<f64>,
    pub count: usize,
}

/// A full grouped summary: the grouping columns, the questions that were
/// present, and one row per group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryTable {
    pub key_columns: Vec<String>,
    pub questions: Vec<String>,
    pub groups: Vec<GroupSummary>,
}

impl SummaryTable {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Finds the group whose key matches `key` exactly.
    pub fn group(&self, key: &[Option<&str>]) -> Option<&GroupSummary> {
        self.groups.iter().find(|g| {
            g.key.len() == key.len()
                && g.key.iter().zip(key).all(|(a, b)| a.as_deref() == *b)
        })
    }
}

/// Square matrix of Pearson coefficients between quantitative questions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        self.values[i][j]
    }
}
