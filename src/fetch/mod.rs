//! HTTP plumbing shared by every outbound client.
//!
//! [`HttpClient`] is the seam: [`BasicClient`] talks to the network and
//! [`auth::ApiKey`] layers credentials on top of any other client.

mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::Result;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Downloads the body at `url`, failing on non-success status codes.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);

    let resp = checked(client.execute(req).await?).await?;
    Ok(resp.bytes().await?.to_vec())
}

/// Executes `req` and decodes a JSON response body into `T`.
pub async fn send_json<C: HttpClient, T: DeserializeOwned>(
    client: &C,
    req: reqwest::Request,
) -> Result<T> {
    let method = req.method().clone();
    let url = req.url().clone();
    debug!(%method, url = %url.path(), "Sending request");

    let resp = checked(client.execute(req).await?).await?;
    resp.json()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to parse response from {}: {}", url.path(), e))
}

async fn checked(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let url = response.url().path().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(anyhow::anyhow!(
        "{} returned status {}: {}",
        url,
        status,
        body
    ))
}
