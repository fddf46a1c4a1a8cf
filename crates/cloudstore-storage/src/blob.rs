//! The blob store capability and its error type

use async_trait::async_trait;
use cloudstore_core::BlobHandle;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{provider}: HTTP request failed: {source}")]
    Http {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider}: HTTP status {status}: {body}")]
    Status {
        provider: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("{provider}: unexpected response: {message}")]
    Response { provider: String, message: String },

    #[error("{provider}: backend error: {source}")]
    Backend {
        provider: String,
        #[source]
        source: opendal::Error,
    },

    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("blob {hash} failed integrity check")]
    IntegrityMismatch { hash: String },

    #[error("all storage providers failed: {}", .0.join(", "))]
    AllProvidersFailed(Vec<String>),

    #[error("no storage providers configured")]
    NoProviders,

    #[error("storage config error: {0}")]
    Config(String),
}

/// A content-addressed blob store: bytes in, content hash out.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Provider name used in handles, logs, and config
    fn name(&self) -> &str;

    /// Store `bytes` and return the handle the provider assigned.
    async fn upload(&self, bytes: &[u8], file_name: &str) -> Result<BlobHandle, StorageError>;

    /// Fetch the bytes previously stored under `hash`.
    async fn fetch(&self, hash: &str) -> Result<Vec<u8>, StorageError>;

    /// Cheap reachability probe. Stores without one report healthy.
    async fn health(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
