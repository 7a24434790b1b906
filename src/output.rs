//! Output formatting and persistence for pipeline results.
//!
//! Supports JSON logging and CSV/JSON/XLSX files in the output directory.

use anyhow::{Context, Result};
use csv::Writer;
use rust_xlsxwriter::Workbook;
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::analyzers::{CorrelationMatrix, SummaryTable};
use crate::table::{Cell, Table};
use crate::topics::MappingCount;

/// Logs any serializable result as pretty-printed JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Path of an output file for one session type, e.g. `output/seminar_guide_stats.csv`.
pub fn output_path(dir: &Path, prefix: &str, name: &str) -> PathBuf {
    dir.join(format!("{prefix}_{name}"))
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn create(path: &Path) -> Result<File> {
    create_parent(path)?;
    File::create(path).with_context(|| format!("Failed to create '{}'", path.display()))
}

fn fmt_float(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Writes a grouped summary: key columns, one mean per question,
/// `mean_overall`, then `Count`.
pub fn write_summary_table(path: &Path, summary: &SummaryTable) -> Result<()> {
    let mut writer = Writer::from_writer(create(path)?);

    let header = summary
        .key_columns
        .iter()
        .chain(&summary.questions)
        .map(String::as_str)
        .chain(["mean_overall", "Count"]);
    writer.write_record(header)?;

    for group in &summary.groups {
        let mut record: Vec<String> = group
            .key
            .iter()
            .map(|k| k.clone().unwrap_or_default())
            .collect();
        record.extend(group.means.iter().map(|m| fmt_float(*m)));
        record.push(fmt_float(group.mean_overall));
        record.push(group.count.to_string());
        writer.write_record(&record)?;
    }

    writer.flush()?;
    debug!(path = %path.display(), rows = summary.len(), "Summary written");
    Ok(())
}

/// Writes the correlation matrix with the question names as both the
/// header row and the first column.
pub fn write_correlation_matrix(path: &Path, matrix: &CorrelationMatrix) -> Result<()> {
    let mut writer = Writer::from_writer(create(path)?);

    writer.write_record(std::iter::once("").chain(matrix.columns.iter().map(String::as_str)))?;
    for (name, row) in matrix.columns.iter().zip(&matrix.values) {
        let mut record = vec![name.clone()];
        record.extend(row.iter().map(|v| fmt_float(*v)));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    debug!(path = %path.display(), columns = matrix.columns.len(), "Correlations written");
    Ok(())
}

/// Writes the topic comparison table: each raw topic, its match and how
/// many responses used it.
pub fn write_mapping_details(path: &Path, details: &[MappingCount]) -> Result<()> {
    let mut writer = Writer::from_writer(create(path)?);
    for detail in details {
        writer.serialize(detail)?;
    }
    if details.is_empty() {
        writer.write_record(["topic", "matched_topic", "count"])?;
    }

    writer.flush()?;
    debug!(path = %path.display(), rows = details.len(), "Topic mapping written");
    Ok(())
}

pub fn write_table(path: &Path, table: &Table) -> Result<()> {
    table.write_csv(create(path)?)?;
    debug!(path = %path.display(), rows = table.len(), "Table written");
    Ok(())
}

/// Writes the table to a single-sheet workbook. Integer cells are stored as
/// numbers and each column is as wide as its longest value plus two.
pub fn write_table_xlsx(path: &Path, table: &Table) -> Result<()> {
    create_parent(path)?;
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    for (col, name) in table.columns().iter().enumerate() {
        let col = u16::try_from(col).context("Too many columns for a worksheet")?;
        sheet.write_string(0, col, name.as_str())?;
    }

    let mut widths: Vec<usize> = table.columns().iter().map(|c| c.chars().count()).collect();
    for (row_idx, row) in table.rows().iter().enumerate() {
        let row_num = u32::try_from(row_idx + 1).context("Too many rows for a worksheet")?;
        for (col, cell) in row.iter().enumerate() {
            let text = cell.to_string();
            widths[col] = widths[col].max(text.chars().count());

            let col = u16::try_from(col).context("Too many columns for a worksheet")?;
            match cell {
                Cell::Missing => {}
                Cell::Int(n) => {
                    sheet.write_number(row_num, col, *n as f64)?;
                }
                _ => {
                    sheet.write_string(row_num, col, text.as_str())?;
                }
            }
        }
    }

    for (col, width) in widths.into_iter().enumerate() {
        let col = u16::try_from(col).context("Too many columns for a worksheet")?;
        sheet.set_column_width(col, (width + 2) as f64)?;
    }

    workbook
        .save(path)
        .with_context(|| format!("Failed to write '{}'", path.display()))?;
    debug!(path = %path.display(), rows = table.len(), "Workbook written");
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(create(path)?, value)?;
    debug!(path = %path.display(), "JSON written");
    Ok(())
}
