//! Google Forms API client.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

use crate::fetch::{HttpClient, send_json};
use crate::questions::TIMESTAMP;
use crate::services::ResponseSource;
use crate::table::{Cell, Table};

const FORMS_BASE_URL: &str = "https://forms.googleapis.com/v1/forms";

pub const RESPONSE_ID: &str = "response_id";
const FILE_UPLOADED: &str = "File uploaded";

#[derive(Debug, Deserialize)]
struct Form {
    #[serde(default)]
    info: FormMeta,
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Debug, Default, Deserialize)]
struct FormMeta {
    title: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Item {
    #[serde(default)]
    title: String,
    question_item: Option<QuestionItem>,
}

#[derive(Debug, Deserialize)]
struct QuestionItem {
    question: Question,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Question {
    question_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePage {
    #[serde(default)]
    responses: Vec<FormResponse>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FormResponse {
    #[serde(default)]
    response_id: String,
    #[serde(default)]
    last_submitted_time: String,
    #[serde(default)]
    answers: HashMap<String, serde_json::Value>,
}

/// Basic facts about a form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormInfo {
    pub title: String,
    pub description: String,
    /// Number of items on the form.
    pub questions: usize,
}

impl Form {
    fn to_info(&self) -> FormInfo {
        FormInfo {
            title: self.info.title.clone().unwrap_or_else(|| "Unknown".to_string()),
            description: self.info.description.clone().unwrap_or_default(),
            questions: self.items.len(),
        }
    }
}

pub struct FormsClient<C> {
    http: C,
    builder: reqwest::Client,
}

impl<C: HttpClient> FormsClient<C> {
    pub fn new(http: C) -> Self {
        Self {
            http,
            builder: reqwest::Client::new(),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_form_info(&self, form_id: &str) -> Result<FormInfo> {
        let form = self.get_form(form_id).await?;
        Ok(form.to_info())
    }

    /// Fetches every response to the form, one row per submission.
    #[tracing::instrument(skip(self))]
    pub async fn get_responses(&self, form_id: &str) -> Result<Table> {
        let form = self.get_form(form_id).await?;

        let mut responses = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut req = self
                .builder
                .get(format!("{}/{}/responses", FORMS_BASE_URL, form_id));
            if let Some(token) = &page_token {
                req = req.query(&[("pageToken", token.as_str())]);
            }

            let page: ResponsePage = send_json(&self.http, req.build()?).await?;
            responses.extend(page.responses);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        if responses.is_empty() {
            info!("No responses found");
        } else {
            info!(responses = responses.len(), "Form responses fetched");
        }
        Ok(responses_to_table(&form, responses))
    }

    async fn get_form(&self, form_id: &str) -> Result<Form> {
        let req = self
            .builder
            .get(format!("{}/{}", FORMS_BASE_URL, form_id))
            .build()?;
        send_json(&self.http, req).await
    }
}

/// Reads the form's submissions directly. `title` is the form ID and the
/// worksheet is ignored.
#[async_trait::async_trait]
impl<C: HttpClient> ResponseSource for FormsClient<C> {
    async fn fetch_responses(&self, title: &str, _worksheet: &str) -> Result<Table> {
        self.get_responses(title).await
    }
}

/// Flattens API responses into a table with one column per question,
/// ordered as on the form.
fn responses_to_table(form: &Form, responses: Vec<FormResponse>) -> Table {
    if responses.is_empty() {
        return Table::default();
    }

    let titles: HashMap<&str, &str> = form
        .items
        .iter()
        .filter_map(|item| {
            let q = item.question_item.as_ref()?;
            Some((q.question.question_id.as_str(), item.title.as_str()))
        })
        .collect();

    let mut columns = vec![RESPONSE_ID.to_string(), TIMESTAMP.to_string()];
    for item in &form.items {
        if item.question_item.is_some() && !columns.contains(&item.title) {
            columns.push(item.title.clone());
        }
    }

    let mut table = Table::new(columns);
    for response in responses {
        let mut row = vec![Cell::Missing; table.columns().len()];
        row[0] = Cell::text(response.response_id);
        row[1] = Cell::text(response.last_submitted_time);

        let mut answers: Vec<_> = response.answers.into_iter().collect();
        answers.sort_by(|a, b| a.0.cmp(&b.0));
        for (question_id, answer) in answers {
            let column = titles
                .get(question_id.as_str())
                .map(|t| t.to_string())
                .unwrap_or_else(|| format!("Question_{question_id}"));

            let idx = match table.column_index(&column) {
                Some(idx) => idx,
                None => {
                    table.set_column(&column, vec![Cell::Missing; table.len()]);
                    row.push(Cell::Missing);
                    row.len() - 1
                }
            };
            row[idx] = Cell::text(answer_text(&answer));
        }

        table.push_row(row);
    }
    table
}

fn answer_text(answer: &serde_json::Value) -> String {
    if let Some(text) = answer.get("textAnswers") {
        return text
            .get("answers")
            .and_then(|a| a.as_array())
            .map(|answers| {
                answers
                    .iter()
                    .map(|a| a.get("value").and_then(|v| v.as_str()).unwrap_or_default())
                    .collect::<Vec<_>>()
                    .join("; ")
            })
            .unwrap_or_default();
    }
    if answer.get("fileUploadAnswers").is_some() {
        return FILE_UPLOADED.to_string();
    }
    answer.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaner::clean_responses;
    use crate::questions::WEEK_START;
    use serde_json::json;

    fn form() -> Form {
        serde_json::from_value(json!({
            "formId": "abc",
            "info": {"title": "Seminar Feedback"},
            "items": [
                {"itemId": "1", "title": "What was the topic?", "questionItem": {"question": {"questionId": "q1"}}},
                {"itemId": "2", "title": "Section header"},
                {"itemId": "3", "title": "Pick all that apply", "questionItem": {"question": {"questionId": "q2"}}},
                {"itemId": "4", "title": "Upload a drawing", "questionItem": {"question": {"questionId": "q3"}}}
            ]
        }))
        .unwrap()
    }

    fn page(value: serde_json::Value) -> Vec<FormResponse> {
        serde_json::from_value::<ResponsePage>(value).unwrap().responses
    }

    #[test]
    fn test_form_info_defaults() {
        let info = form().to_info();
        assert_eq!(info.title, "Seminar Feedback");
        assert_eq!(info.description, "");
        assert_eq!(info.questions, 4);

        let empty: Form = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty.to_info().title, "Unknown");
    }

    #[test]
    fn test_responses_flattened() {
        let responses = page(json!({
            "responses": [{
                "responseId": "r1",
                "lastSubmittedTime": "2025-09-02T15:04:05.123Z",
                "answers": {
                    "q1": {"questionId": "q1", "textAnswers": {"answers": [{"value": "Volcanoes"}]}},
                    "q2": {"questionId": "q2", "textAnswers": {"answers": [{"value": "A"}, {"value": "B"}]}},
                    "q3": {"questionId": "q3", "fileUploadAnswers": {"answers": [{"fileId": "f"}]}}
                }
            }, {
                "responseId": "r2",
                "lastSubmittedTime": "2025-09-03T10:00:00Z",
                "answers": {
                    "q9": {"questionId": "q9", "textAnswers": {"answers": [{"value": "late"}]}}
                }
            }]
        }));

        let table = responses_to_table(&form(), responses);
        assert_eq!(
            table.columns(),
            &[
                "response_id",
                "Timestamp",
                "What was the topic?",
                "Pick all that apply",
                "Upload a drawing",
                "Question_q9"
            ]
        );
        let first = &table.rows()[0];
        assert_eq!(first[2], Cell::text("Volcanoes"));
        assert_eq!(first[3], Cell::text("A; B"));
        assert_eq!(first[4], Cell::text("File uploaded"));
        assert_eq!(first[5], Cell::Missing);

        let second = &table.rows()[1];
        assert_eq!(second[0], Cell::text("r2"));
        assert_eq!(second[2], Cell::Missing);
        assert_eq!(second[5], Cell::text("late"));
    }

    #[test]
    fn test_submission_time_feeds_week_columns() {
        let responses = page(json!({
            "responses": [{
                "responseId": "r1",
                "lastSubmittedTime": "2025-09-04T15:04:05.123Z",
                "answers": {
                    "q1": {"questionId": "q1", "textAnswers": {"answers": [{"value": "Volcanoes"}]}}
                }
            }]
        }));

        let cleaned = clean_responses(responses_to_table(&form(), responses));
        let week_start = cleaned.column_index(WEEK_START).unwrap();
        assert_eq!(cleaned.rows()[0][week_start], Cell::text("2025-09-01"));
    }

    #[test]
    fn test_no_responses_is_empty_table() {
        let responses = page(json!({}));
        let table = responses_to_table(&form(), responses);
        assert!(table.is_empty());
    }
}
