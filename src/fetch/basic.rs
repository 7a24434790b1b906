use super::client::HttpClient;
use async_trait::async_trait;

#[derive(Clone, Default)]
pub struct BasicClient(reqwest::Client);

impl BasicClient {
    pub fn new() -> Self {
        Self(reqwest::Client::new())
    }

    /// The underlying client, for assembling requests with its builder API.
    pub fn inner(&self) -> &reqwest::Client {
        &self.0
    }
}

#[async_trait]
impl HttpClient for BasicClient {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        self.0.execute(req).await
    }
}
