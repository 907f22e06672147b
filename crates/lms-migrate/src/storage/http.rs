//! HTTP implementations of the storage traits.

use super::{
    error_message, parse_upload_response, DownloadError, FileFetcher, RemoteFile, StorageClient,
    UploadError,
};
use crate::config::StorageConfig;
use crate::error::{MigrateError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(MigrateError::Http)
}

/// Downloads files with plain HTTP GET requests.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher with a per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl FileFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<Bytes, DownloadError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status(status));
        }

        let bytes = response.bytes().await?;
        debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes)
    }
}

/// Uploads files to the destination storage API as multipart form posts.
pub struct HttpStorageClient {
    client: Client,
    upload_url: String,
    token: String,
}

impl HttpStorageClient {
    /// Create a client from resolved storage configuration.
    pub fn new(config: &StorageConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            upload_url: config.upload_url.clone(),
            token: config.token.clone(),
        })
    }
}

#[async_trait]
impl StorageClient for HttpStorageClient {
    async fn upload(
        &self,
        bytes: Bytes,
        file_name: &str,
        mime_type: &str,
    ) -> std::result::Result<RemoteFile, UploadError> {
        let size = bytes.len();
        let part = Part::bytes(bytes.to_vec())
            .file_name(file_name.to_string())
            .mime_str(mime_type)?;
        let form = Form::new().part("files", part);

        let response = self
            .client
            .post(&self.upload_url)
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // Surface the API's own message when the body is JSON.
            let body = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("error").map(error_message))
                .unwrap_or(body);
            return Err(UploadError::Status { status, body });
        }

        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| UploadError::InvalidResponse(e.to_string()))?;

        debug!("Uploaded {} ({} bytes, {})", file_name, size, mime_type);
        parse_upload_response(&value)
    }
}
