//! Google Cloud Storage object store (JSON API)
//!
//! Uploads use a single-request media upload, so an object only becomes
//! visible once the whole body has been accepted.

use super::object::{ObjectPath, ObjectStore};
use crate::client::GoogleClient;
use crate::error::{Result, StageError};
use reqwest::StatusCode;

pub const GCS_ENDPOINT: &str = "https://storage.googleapis.com";

/// Object store backed by a Cloud Storage endpoint
#[derive(Debug, Clone)]
pub struct GcsObjectStore {
    client: GoogleClient,
}

impl GcsObjectStore {
    pub fn new(client: GoogleClient) -> Self {
        Self { client }
    }
}

impl ObjectStore for GcsObjectStore {
    async fn put(&self, path: &ObjectPath, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let size = bytes.len();
        let response = self
            .client
            .post_bytes(
                &["upload", "storage", "v1", "b", path.bucket(), "o"],
                &[("uploadType", "media"), ("name", path.key())],
                bytes,
                content_type,
            )
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::write_failure(path, format!("{}: {}", status, body)));
        }

        log::debug!("Uploaded {} bytes to {}", size, path.uri());
        Ok(())
    }

    async fn get(&self, path: &ObjectPath) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(
                &["storage", "v1", "b", path.bucket(), "o", path.key()],
                &[("alt", "media")],
            )
            .await?;

        match response.status() {
            status if status.is_success() => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| StageError::source_unreadable(path, e))?;
                log::debug!("Downloaded {} bytes from {}", bytes.len(), path.uri());
                Ok(bytes.to_vec())
            }
            StatusCode::NOT_FOUND => Err(StageError::source_unreadable(path, "object not found")),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(StageError::source_unreadable(path, format!("{}: {}", status, body)))
            }
        }
    }
}
