//! Service-account authentication for Google APIs.

use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::fetch::auth::ApiKey;
use crate::fetch::{BasicClient, HttpClient, send_json};

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

pub const FORMS_BODY_READONLY: &str = "https://www.googleapis.com/auth/forms.body.readonly";
pub const FORMS_RESPONSES_READONLY: &str =
    "https://www.googleapis.com/auth/forms.responses.readonly";
pub const SPREADSHEETS_READONLY: &str = "https://www.googleapis.com/auth/spreadsheets.readonly";
pub const DRIVE_READONLY: &str = "https://www.googleapis.com/auth/drive.readonly";
pub const DRIVE: &str = "https://www.googleapis.com/auth/drive";

/// Scopes for reading forms and response spreadsheets.
pub const READ_SCOPES: &[&str] = &[
    FORMS_BODY_READONLY,
    FORMS_RESPONSES_READONLY,
    SPREADSHEETS_READONLY,
    DRIVE_READONLY,
];

/// Scopes for uploading output files.
pub const UPLOAD_SCOPES: &[&str] = &[DRIVE];

/// The fields of a downloaded service-account JSON key that are needed to
/// mint access tokens.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Service account file not found at '{}'", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid service account file '{}'", path.display()))
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    assertion: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Signs the JWT assertion exchanged for an access token.
pub fn signed_assertion(key: &ServiceAccountKey, scopes: &[&str], issued_at: i64) -> Result<String> {
    let claims = Claims {
        iss: &key.client_email,
        scope: scopes.join(" "),
        aud: &key.token_uri,
        iat: issued_at,
        exp: issued_at + ASSERTION_LIFETIME_SECS,
    };

    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .context("Service account private key is not a valid RSA PEM key")?;
    Ok(jsonwebtoken::encode(
        &Header::new(Algorithm::RS256),
        &claims,
        &encoding_key,
    )?)
}

/// Exchanges a signed assertion for an OAuth access token.
#[tracing::instrument(skip(client, key), fields(client_email = %key.client_email))]
pub async fn exchange_token<C: HttpClient>(
    client: &C,
    key: &ServiceAccountKey,
    scopes: &[&str],
) -> Result<String> {
    let assertion = signed_assertion(key, scopes, Utc::now().timestamp())?;

    let req = reqwest::Client::new()
        .post(&key.token_uri)
        .form(&TokenRequest {
            grant_type: JWT_BEARER_GRANT,
            assertion: &assertion,
        })
        .build()?;

    let token: TokenResponse = send_json(client, req)
        .await
        .context("Token exchange failed")?;
    debug!("Access token issued");
    Ok(token.access_token)
}

/// An authorized HTTP client for Google APIs.
pub type GoogleClient = ApiKey<BasicClient>;

/// Reads the service-account key at `path` and returns a client that sends
/// a bearer token for `scopes` with every request.
pub async fn authorize(path: &Path, scopes: &[&str]) -> Result<GoogleClient> {
    let key = ServiceAccountKey::from_file(path)?;
    let basic = BasicClient::new();
    let token = exchange_token(&basic, &key, scopes).await?;

    info!(client_email = %key.client_email, scopes = scopes.len(), "Authenticated with Google");
    ApiKey::bearer(basic, &token)
}
