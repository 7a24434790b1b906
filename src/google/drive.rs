//! Google Drive uploads.
//!
//! Files are matched by name inside the target folder: an existing file is
//! overwritten in place, otherwise a new one is created.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::fetch::{HttpClient, send_json};

pub(crate) const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const DRIVE_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const MULTIPART_BOUNDARY: &str = "feedback_analytics_upload_boundary";

#[derive(Debug, Default, Deserialize)]
pub(crate) struct FileList {
    #[serde(default)]
    pub(crate) files: Vec<DriveFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DriveFile {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) name: String,
}

/// Escapes a literal for use inside a single-quoted Drive query string.
pub(crate) fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

pub struct DriveClient<C> {
    http: C,
    builder: reqwest::Client,
}

impl<C: HttpClient> DriveClient<C> {
    pub fn new(http: C) -> Self {
        Self {
            http,
            builder: reqwest::Client::new(),
        }
    }

    /// Uploads every regular, non-hidden file in `local_dir`.
    ///
    /// Without `folder_id` files go to the account's root. A file that
    /// fails to upload is logged and skipped. Returns the names uploaded.
    #[tracing::instrument(skip(self, local_dir), fields(dir = %local_dir.display()))]
    pub async fn upload_files(&self, folder_id: Option<&str>, local_dir: &Path) -> Result<Vec<String>> {
        let files = uploadable_files(local_dir)?;
        if files.is_empty() {
            warn!("No files to upload");
            return Ok(Vec::new());
        }

        info!(count = files.len(), "Uploading files to Drive");

        let mut uploaded = Vec::new();
        for path in files {
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };

            match self.upload_file(folder_id, &path, &name).await {
                Ok(id) => {
                    info!(file = %name, id = %id, "Uploaded");
                    uploaded.push(name);
                }
                Err(e) => error!(file = %name, error = %e, "Upload failed"),
            }
        }

        info!(uploaded = uploaded.len(), "Drive upload complete");
        Ok(uploaded)
    }

    /// Creates a folder and returns its ID.
    #[tracing::instrument(skip(self))]
    pub async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<String> {
        let mut metadata = json!({ "name": name, "mimeType": FOLDER_MIME });
        if let Some(parent) = parent_id {
            metadata["parents"] = json!([parent]);
        }

        let req = self
            .builder
            .post(DRIVE_FILES_URL)
            .query(&[("supportsAllDrives", "true"), ("fields", "id, name")])
            .json(&metadata)
            .build()?;

        let folder: DriveFile = send_json(&self.http, req).await?;
        info!(name = %folder.name, id = %folder.id, "Folder created");
        Ok(folder.id)
    }

    async fn upload_file(&self, folder_id: Option<&str>, path: &Path, name: &str) -> Result<String> {
        let content = std::fs::read(path)
            .with_context(|| format!("Failed to read '{}'", path.display()))?;
        let mime = mime_type(name);

        if let Some(existing) = self.find_file(folder_id, name).await? {
            debug!(file = name, id = %existing.id, "Updating existing file");
            let req = self
                .builder
                .patch(format!("{}/{}", DRIVE_UPLOAD_URL, existing.id))
                .query(&[("uploadType", "media"), ("supportsAllDrives", "true")])
                .header(reqwest::header::CONTENT_TYPE, mime)
                .body(content)
                .build()?;
            let file: DriveFile = send_json(&self.http, req).await?;
            return Ok(file.id);
        }

        let mut metadata = json!({ "name": name });
        if let Some(folder) = folder_id {
            metadata["parents"] = json!([folder]);
        }

        let req = self
            .builder
            .post(DRIVE_UPLOAD_URL)
            .query(&[
                ("uploadType", "multipart"),
                ("supportsAllDrives", "true"),
                ("fields", "id, name"),
            ])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(multipart_body(&metadata, mime, &content))
            .build()?;
        let file: DriveFile = send_json(&self.http, req).await?;
        Ok(file.id)
    }

    async fn find_file(&self, folder_id: Option<&str>, name: &str) -> Result<Option<DriveFile>> {
        let mut query = format!("name = '{}' and trashed = false", escape_query(name));
        if let Some(folder) = folder_id {
            query.push_str(&format!(" and '{}' in parents", escape_query(folder)));
        }

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
        Ok(list.files.into_iter().next())
    }
}

/// Regular, non-hidden files directly inside `dir`, sorted by name.
fn uploadable_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Local folder '{}' does not exist", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if path.is_file() && !hidden {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn mime_type(name: &str) -> &'static str {
    match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

fn multipart_body(metadata: &serde_json::Value, mime: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + 256);
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n--{b}\r\nContent-Type: {mime}\r\n\r\n",
            b = MULTIPART_BOUNDARY
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
    body
}
