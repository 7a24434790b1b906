//! Response spreadsheets read through the Sheets and Drive APIs.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::drive::{DRIVE_FILES_URL, FileList, escape_query};
use crate::fetch::{HttpClient, send_json};
use crate::services::response_source::ResponseSource;
use crate::table::Table;

const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

pub struct SheetsClient<C> {
    http: C,
    builder: reqwest::Client,
}

impl<C: HttpClient> SheetsClient<C> {
    pub fn new(http: C) -> Self {
        Self {
            http,
            builder: reqwest::Client::new(),
        }
    }

    /// Looks up a spreadsheet's ID by its exact title.
    #[tracing::instrument(skip(self))]
    pub async fn find_spreadsheet_id(&self, title: &str) -> Result<String> {
        let query = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            escape_query(title),
            SPREADSHEET_MIME
        );
        let req = self
            .builder
            .get(DRIVE_FILES_URL)
            .query(&[
                ("q", query.as_str()),
                ("fields", "files(id, name)"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ])
            .build()?;

        let list: FileList = send_json(&self.http, req).await?;
        list.files
            .into_iter()
            .next()
            .map(|f| f.id)
            .ok_or_else(|| anyhow::anyhow!("Spreadsheet '{}' not found", title))
    }

    /// Reads `range` (a worksheet name or A1 range) as a table whose first
    /// row is the header.
    #[tracing::instrument(skip(self))]
    pub async fn get_values(&self, spreadsheet_id: &str, range: &str) -> Result<Table> {
        let mut url = reqwest::Url::parse(SHEETS_BASE_URL)?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Invalid Sheets base URL"))?
            .extend([spreadsheet_id, "values", range]);

        let req = self.builder.get(url).build()?;
        let range: ValueRange = send_json(&self.http, req).await?;
        Ok(values_to_table(range.values))
    }
}

#[async_trait]
impl<C: HttpClient> ResponseSource for SheetsClient<C> {
    async fn fetch_responses(&self, title: &str, worksheet: &str) -> Result<Table> {
        let id = self.find_spreadsheet_id(title).await?;
        let table = self.get_values(&id, worksheet).await?;

        if table.is_empty() {
            info!(title, "No responses found");
        } else {
            info!(title, responses = table.len(), "Responses fetched");
        }
        Ok(table)
    }
}

fn values_to_table(values: Vec<Vec<serde_json::Value>>) -> Table {
    let mut rows = values.into_iter().map(|row| {
        row.into_iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            })
            .collect::<Vec<String>>()
    });

    match rows.next() {
        Some(headers) => Table::from_strings(headers, rows.collect()),
        None => Table::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Cell;
    use serde_json::json;

    #[test]
    fn test_values_to_table_pads_ragged_rows() {
        let values: ValueRange = serde_json::from_value(json!({
            "range": "'Form Responses 1'!A1:C3",
            "values": [["Timestamp", "topic", "score"], ["8/14/2025 10:00:00", "Rockets", 7], ["8/14/2025 11:00:00"]]
        }))
        .unwrap();

        let table = values_to_table(values.values);
        assert_eq!(table.columns(), &["Timestamp", "topic", "score"]);
        assert_eq!(table.rows()[0][2], Cell::text("7"));
        assert_eq!(table.rows()[1][1], Cell::Missing);
    }

    #[test]
    fn test_empty_range_is_empty_table() {
        let values: ValueRange = serde_json::from_value(json!({"range": "A1"})).unwrap();
        let table = values_to_table(values.values);
        assert!(table.is_empty());
        assert!(table.columns().is_empty());
    }
}
