//! Column-named tabular storage for survey responses.
//!
//! A [`Table`] keeps an ordered list of column names and row-major cells.
//! Columns come and go as forms evolve, so lookups are by name and every
//! consumer tolerates absent columns.

use anyhow::Result;
use chrono::NaiveDateTime;
use std::fmt;
use std::io::{Read, Write};

use crate::errors::AnalyticsError;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single table value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Missing,
    Text(String),
    Int(i64),
    Timestamp(NaiveDateTime),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Cell::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// String form used for grouping keys; `None` for missing cells.
    pub fn key(&self) -> Option<String> {
        match self {
            Cell::Missing => None,
            other => Some(other.to_string()),
        }
    }

    pub fn from_option(value: Option<String>) -> Self {
        value.map(Cell::Text).unwrap_or_default()
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Missing => Ok(()),
            Cell::Text(s) => f.write_str(s),
            Cell::Int(n) => write!(f, "{n}"),
            Cell::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Builds a table of text cells. Short rows are padded with
    /// [`Cell::Missing`], long rows are truncated to the header width.
    pub fn from_strings(headers: Vec<String>, records: Vec<Vec<String>>) -> Self {
        let width = headers.len();
        let rows = records
            .into_iter()
            .map(|record| {
                let mut row: Vec<Cell> = record.into_iter().take(width).map(Cell::Text).collect();
                row.resize(width, Cell::Missing);
                row
            })
            .collect();

        Self {
            columns: headers,
            rows,
        }
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();

        let mut records = Vec::new();
        for result in rdr.records() {
            let record = result?;
            records.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self::from_strings(headers, records))
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row.iter().map(|cell| cell.to_string()))?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [Vec<Cell>] {
        &mut self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Like [`Table::column_index`] but fails with a typed error.
    pub fn require_column(&self, name: &str) -> Result<usize, AnalyticsError> {
        self.column_index(name)
            .ok_or_else(|| AnalyticsError::MissingColumn(name.to_string()))
    }

    /// Returns the subset of `names` present in this table, preserving the
    /// order of `names`.
    pub fn present_columns(&self, names: &[&str]) -> Vec<String> {
        names
            .iter()
            .filter(|name| self.has_column(name))
            .map(|name| name.to_string())
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Cell>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), Cell::Missing);
        self.rows.push(row);
    }

    /// Replaces the named column, or appends it when absent.
    ///
    /// `values` must hold one cell per row.
    pub fn set_column(&mut self, name: &str, values: Vec<Cell>) {
        debug_assert_eq!(values.len(), self.rows.len());
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
    }

    /// Applies `f` to every cell of the named column. No-op when absent.
    pub fn map_column(&mut self, name: &str, mut f: impl FnMut(&Cell) -> Cell) {
        if let Some(idx) = self.column_index(name) {
            for row in &mut self.rows {
                row[idx] = f(&row[idx]);
            }
        }
    }

    /// Applies `f` to every cell in the table.
    pub fn map_cells(&mut self, mut f: impl FnMut(&Cell) -> Cell) {
        for row in &mut self.rows {
            for cell in row.iter_mut() {
                *cell = f(cell);
            }
        }
    }

    /// Keeps only the columns for which `keep` returns true.
    pub fn retain_columns(&mut self, mut keep: impl FnMut(&str, usize) -> bool) {
        let mask: Vec<bool> = self
            .columns
            .iter()
            .enumerate()
            .map(|(idx, name)| keep(name, idx))
            .collect();

        let mut i = 0;
        self.columns.retain(|_| {
            let k = mask[i];
            i += 1;
            k
        });

        for row in &mut self.rows {
            let mut j = 0;
            row.retain(|_| {
                let k = mask[j];
                j += 1;
                k
            });
        }
    }

    /// True when every row holds [`Cell::Missing`] at `idx`.
    pub fn column_all_missing(&self, idx: usize) -> bool {
        self.rows.iter().all(|row| row[idx].is_missing())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::from_strings(
            vec!["a".into(), "b".into()],
            vec![vec!["1".into(), "x".into()], vec!["2".into()]],
        )
    }

    #[test]
    fn test_from_strings_pads_short_rows() {
        let table = sample();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[1][1], Cell::Missing);
    }

    #[test]
    fn test_from_strings_truncates_long_rows() {
        let table = Table::from_strings(
            vec!["a".into()],
            vec![vec!["1".into(), "overflow".into()]],
        );
        assert_eq!(table.rows()[0].len(), 1);
    }

    #[test]
    fn test_set_column_appends_and_replaces() {
        let mut table = sample();
        table.set_column("c", vec![Cell::Int(1), Cell::Int(2)]);
        assert_eq!(table.columns(), &["a", "b", "c"]);

        table.set_column("a", vec![Cell::Missing, Cell::text("z")]);
        assert_eq!(table.rows()[0][0], Cell::Missing);
        assert_eq!(table.rows()[1][0], Cell::text("z"));
    }

    #[test]
    fn test_retain_columns_drops_cells() {
        let mut table = sample();
        table.retain_columns(|name, _| name != "a");
        assert_eq!(table.columns(), &["b"]);
        assert_eq!(table.rows()[0], vec![Cell::text("x")]);
    }

    #[test]
    fn test_require_column_reports_name() {
        let table = sample();
        let err = table.require_column("missing").unwrap_err();
        assert_eq!(err.to_string(), "column 'missing' not found in table");
    }

    #[test]
    fn test_csv_round_trip_keeps_missing_as_empty() {
        let mut table = sample();
        table.set_column("n", vec![Cell::Int(7), Cell::Missing]);

        let mut buf = Vec::new();
        table.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().next(), Some("a,b,n"));
        assert_eq!(text.lines().nth(2), Some("2,,"));

        let reread = Table::from_csv_reader(text.as_bytes()).unwrap();
        assert_eq!(reread.rows()[0][2], Cell::text("7"));
    }

    #[test]
    fn test_timestamp_display_format() {
        let ts = chrono::NaiveDate::from_ymd_opt(2025, 8, 13)
            .unwrap()
            .and_hms_opt(9, 5, 0)
            .unwrap();
        assert_eq!(Cell::Timestamp(ts).to_string(), "2025-08-13 09:05:00");
    }
}
