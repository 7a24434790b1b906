use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CompletionModel, CompletionRequest};
use crate::fetch::auth::ApiKey;
use crate::fetch::{BasicClient, HttpClient, send_json};

pub const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Chat-completions client for the OpenAI API.
pub struct OpenAiClient<C = ApiKey<BasicClient>> {
    http: C,
    builder: reqwest::Client,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: &str, model: &str) -> Result<Self> {
        let basic = BasicClient::new();
        let builder = basic.inner().clone();
        Ok(Self {
            http: ApiKey::bearer(basic, api_key)?,
            builder,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.to_string(),
        })
    }
}

impl<C> OpenAiClient<C> {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl<C: HttpClient> CompletionModel for OpenAiClient<C> {
    #[tracing::instrument(skip(self, request), fields(model = %self.model, max_tokens = request.max_tokens))]
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let req = self
            .builder
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body)
            .build()?;

        let response: ChatResponse = send_json(&self.http, req).await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow::anyhow!("Completion response contained no choices"))?;

        debug!(chars = content.len(), "Completion received");
        Ok(content.trim().to_string())
    }
}
