use async_trait::async_trait;
use reqwest::{Request, Response};

/// Executes a prepared request. Implemented by the network client and by
/// credential-injecting wrappers around it.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: Request) -> reqwest::Result<Response>;
}
