//! Artifact transfer through pre-signed URLs.
//!
//! The storage service is reached directly, so no bearer token is attached.

use std::path::Path;

use async_trait::async_trait;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Body, Client};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::io::ReaderStream;

/// Where an artifact lives, with its size when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub location: String,
    #[serde(default)]
    pub size_bytes: Option<u64>,
}

impl ArtifactRef {
    /// Final path segment of the location, query string excluded.
    pub fn file_name(&self) -> &str {
        let without_query = self.location.split('?').next().unwrap_or(&self.location);
        without_query
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(without_query)
    }
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transfer rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("transfer failed: {0}")]
    Network(#[from] reqwest::Error),
}

#[async_trait]
pub trait ArtifactTransfer: Send + Sync {
    /// Streams the file at `source` as the raw body of a PUT.
    async fn upload(&self, source: &Path, presigned_url: &str) -> Result<ArtifactRef, ArtifactError>;

    /// Fetches the object and writes it to `destination`, creating parent directories.
    async fn download(&self, presigned_url: &str, destination: &Path) -> Result<ArtifactRef, ArtifactError>;
}

/// [`ArtifactTransfer`] over plain HTTP.
#[derive(Debug, Clone, Default)]
pub struct ArtifactStoreClient {
    client: Client,
}

impl ArtifactStoreClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

async fn rejected(response: reqwest::Response) -> ArtifactError {
    let status = response.status().as_u16();
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    ArtifactError::Rejected { status, message }
}

#[async_trait]
impl ArtifactTransfer for ArtifactStoreClient {
    async fn upload(&self, source: &Path, presigned_url: &str) -> Result<ArtifactRef, ArtifactError> {
        let file = tokio::fs::File::open(source).await?;
        let size = file.metadata().await?.len();
        let body = Body::wrap_stream(ReaderStream::new(file));
        let response = self
            .client
            .put(presigned_url)
            .header(CONTENT_LENGTH, size)
            .body(body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        tracing::debug!(source = %source.display(), size, "artifact uploaded");

        let location = presigned_url.split('?').next().unwrap_or(presigned_url).to_string();
        Ok(ArtifactRef {
            location,
            size_bytes: Some(size),
        })
    }

    async fn download(&self, presigned_url: &str, destination: &Path) -> Result<ArtifactRef, ArtifactError> {
        let response = self.client.get(presigned_url).send().await?;
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        let bytes = response.bytes().await?;

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(destination, &bytes).await?;
        tracing::info!(destination = %destination.display(), size = bytes.len(), "artifact downloaded");

        Ok(ArtifactRef {
            location: destination.display().to_string(),
            size_bytes: Some(bytes.len() as u64),
        })
    }
}
