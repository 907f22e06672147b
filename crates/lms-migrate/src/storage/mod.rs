//! File storage capabilities: downloading from the old account and uploading
//! to the new one.
//!
//! Both sides are traits so the transfer worker can be driven by HTTP in
//! production and by in-memory fakes in tests.

mod http;
mod mime;

pub use http::{HttpFetcher, HttpStorageClient};
pub use mime::mime_for_file;

use crate::error::{MigrateError, Result};
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;

/// A file stored at the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Public URL of the uploaded file.
    pub url: String,
    /// Storage key, when the API reports one.
    pub key: Option<String>,
}

/// Failure to fetch a file from its source URL.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Server answered with a non-2xx status.
    #[error("download failed: HTTP {0}")]
    Status(reqwest::StatusCode),

    /// Connection, timeout or body error.
    #[error("download failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Failure reported by the destination storage API.
#[derive(Error, Debug)]
pub enum UploadError {
    /// The API returned an error payload.
    #[error("upload rejected: {0}")]
    Rejected(String),

    /// The API answered with a non-2xx status.
    #[error("upload failed: HTTP {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    /// The response carried no file URL.
    #[error("upload response has no file URL")]
    MissingUrl,

    /// The response body was not understood.
    #[error("invalid upload response: {0}")]
    InvalidResponse(String),

    /// Connection, timeout or body error.
    #[error("upload failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Reads file contents from their original location.
#[async_trait]
pub trait FileFetcher: Send + Sync {
    /// Download the full body at `url`.
    async fn fetch(&self, url: &str) -> std::result::Result<Bytes, DownloadError>;
}

/// Destination storage API.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Upload `bytes` under `file_name` with the given MIME type.
    async fn upload(
        &self,
        bytes: Bytes,
        file_name: &str,
        mime_type: &str,
    ) -> std::result::Result<RemoteFile, UploadError>;
}

/// Derive an API token from a secret and an application id.
///
/// The token is the base64 encoding of `{"apiKey","appId","regions"}`.
pub fn derive_token(secret: &str, app_id: &str, region: &str) -> Result<String> {
    let payload = serde_json::json!({
        "apiKey": secret,
        "appId": app_id,
        "regions": [region],
    });
    let json = serde_json::to_string(&payload).map_err(MigrateError::Json)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(json))
}

/// Interpret an upload API response body.
///
/// Accepts `{data, error}` directly or wrapped in a one-element array. The
/// file URL is taken from `data.url`, `data.ufsUrl` or `data.fileUrl`, in
/// that order.
pub fn parse_upload_response(body: &Value) -> std::result::Result<RemoteFile, UploadError> {
    let entry = match body {
        Value::Array(items) => items
            .first()
            .ok_or_else(|| UploadError::InvalidResponse("empty response array".into()))?,
        Value::Object(_) => body,
        other => {
            return Err(UploadError::InvalidResponse(format!(
                "expected object, got {}",
                other
            )))
        }
    };

    if let Some(error) = entry.get("error").filter(|e| !e.is_null()) {
        return Err(UploadError::Rejected(error_message(error)));
    }

    let data = entry.get("data").ok_or(UploadError::MissingUrl)?;
    let url = ["url", "ufsUrl", "fileUrl"]
        .iter()
        .filter_map(|field| data.get(*field).and_then(Value::as_str))
        .find(|url| !url.is_empty())
        .ok_or(UploadError::MissingUrl)?;

    Ok(RemoteFile {
        url: url.to_string(),
        key: data.get("key").and_then(Value::as_str).map(str::to_string),
    })
}

/// Pull a readable message out of an API error value.
pub(crate) fn error_message(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}
