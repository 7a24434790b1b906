//! Normalization of raw form responses.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime};
use tracing::{debug, info};

use crate::questions::{
    GUIDE, GUIDE_NAME, LEGACY_SCALE_FACTOR, LEGACY_SCALED, QUANTITATIVE, TIMESTAMP, WEEK,
    WEEK_START, YEAR_WEEK, legacy_scale_cutover,
};
use crate::table::{Cell, Table};

const DATETIME_FORMATS: &[&str] = &["%m/%d/%Y %H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
const DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%Y-%m-%d"];

/// Cleans a raw response table:
///
/// 1. parses `Timestamp`
/// 2. blanks whitespace-only cells and drops all-empty columns
/// 3. coerces the quantitative questions to integers
/// 4. doubles legacy 1–5 answers recorded before the scale cutover
/// 5. derives `week`, `year-week` and `week_start` from the timestamp
/// 6. derives `Guide` from the first non-empty guide-name question
///
/// Absent columns are skipped at every step.
#[tracing::instrument(skip(table), fields(rows = table.len(), columns = table.columns().len()))]
pub fn clean_responses(mut table: Table) -> Table {
    let timestamps = parse_timestamp_column(&mut table);

    table.map_cells(|cell| match cell {
        Cell::Text(s) if s.trim().is_empty() => Cell::Missing,
        other => other.clone(),
    });
    drop_empty_columns(&mut table);

    let quantitative = table.present_columns(QUANTITATIVE);
    for column in &quantitative {
        table.map_column(column, coerce_int);
    }

    rescale_legacy_answers(&mut table, &timestamps);
    add_week_columns(&mut table, &timestamps);
    attribute_guides(&mut table);

    info!(
        rows = table.len(),
        columns = table.columns().len(),
        quantitative = quantitative.len(),
        "Responses cleaned"
    );
    table
}

/// Parses a timestamp in any of the formats Sheets and Forms produce.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_utc());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Monday of the ISO week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

fn parse_timestamp_column(table: &mut Table) -> Vec<Option<NaiveDateTime>> {
    let Some(column) = table.column(TIMESTAMP) else {
        debug!("No timestamp column, skipping time-derived columns");
        return vec![None; table.len()];
    };

    let parsed: Vec<Option<NaiveDateTime>> = column
        .map(|cell| match cell {
            Cell::Timestamp(ts) => Some(*ts),
            Cell::Text(s) => parse_timestamp(s),
            _ => None,
        })
        .collect();

    let unparsed = parsed.iter().filter(|ts| ts.is_none()).count();
    if unparsed > 0 {
        debug!(unparsed, "Timestamps could not be parsed");
    }

    table.set_column(
        TIMESTAMP,
        parsed
            .iter()
            .map(|ts| ts.map(Cell::Timestamp).unwrap_or_default())
            .collect(),
    );
    parsed
}

fn add_week_columns(table: &mut Table, timestamps: &[Option<NaiveDateTime>]) {
    let weeks = timestamps
        .iter()
        .map(|ts| match ts {
            Some(ts) => Cell::Int(ts.iso_week().week() as i64),
            None => Cell::Missing,
        })
        .collect();
    let year_weeks = timestamps
        .iter()
        .map(|ts| match ts {
            Some(ts) => Cell::Text(ts.format("%Y-%W").to_string()),
            None => Cell::Missing,
        })
        .collect();
    let starts = timestamps
        .iter()
        .map(|ts| match ts {
            Some(ts) => Cell::Text(week_start(ts.date()).format("%Y-%m-%d").to_string()),
            None => Cell::Missing,
        })
        .collect();

    table.set_column(WEEK, weeks);
    table.set_column(YEAR_WEEK, year_weeks);
    table.set_column(WEEK_START, starts);
}

fn drop_empty_columns(table: &mut Table) {
    let empty: Vec<usize> = (0..table.columns().len())
        .filter(|&idx| table.column_all_missing(idx))
        .collect();
    if empty.is_empty() {
        return;
    }

    debug!(dropped = empty.len(), "Dropping empty columns");
    table.retain_columns(|_, idx| !empty.contains(&idx));
}

fn coerce_int(cell: &Cell) -> Cell {
    match cell {
        Cell::Int(n) => Cell::Int(*n),
        Cell::Text(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.fract() == 0.0 && in_i64_range(*f))
                        .map(|f| f as i64)
                })
                .map(Cell::Int)
                .unwrap_or_default()
        }
        _ => Cell::Missing,
    }
}

/// `i64::MAX as f64` rounds up to 2^63, so the upper bound is exclusive.
fn in_i64_range(f: f64) -> bool {
    f >= i64::MIN as f64 && f < i64::MAX as f64
}

fn rescale_legacy_answers(table: &mut Table, timestamps: &[Option<NaiveDateTime>]) {
    let cutover = legacy_scale_cutover();
    let columns: Vec<usize> = table
        .present_columns(LEGACY_SCALED)
        .iter()
        .filter_map(|name| table.column_index(name))
        .collect();
    if columns.is_empty() {
        return;
    }

    let mut rescaled = 0usize;
    for (row, ts) in table.rows_mut().iter_mut().zip(timestamps) {
        if !matches!(ts, Some(ts) if *ts < cutover) {
            continue;
        }
        for &idx in &columns {
            if let Cell::Int(n) = row[idx] {
                row[idx] = n
                    .checked_mul(LEGACY_SCALE_FACTOR)
                    .map(Cell::Int)
                    .unwrap_or_default();
            }
        }
        rescaled += 1;
    }

    debug!(rescaled, "Legacy answers rescaled");
}

fn attribute_guides(table: &mut Table) {
    let sources: Vec<usize> = table
        .present_columns(GUIDE_NAME)
        .iter()
        .filter_map(|name| table.column_index(name))
        .collect();

    let guides = table
        .rows()
        .iter()
        .map(|row| {
            sources
                .iter()
                .map(|&idx| &row[idx])
                .find(|cell| !cell.is_missing())
                .cloned()
                .unwrap_or_default()
        })
        .collect();

    table.set_column(GUIDE, guides);
}
