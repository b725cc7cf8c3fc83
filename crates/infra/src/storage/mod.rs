//! Object storage behind a small trait: artifact upload/download and
//! presigned links.

mod http;
mod memory;

pub use http::HttpObjectStore;
pub use memory::InMemoryObjectStore;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object {key} not found")]
    NotFound { key: String },
    #[error("storage {operation} for {key} failed: {message}")]
    Gateway {
        operation: &'static str,
        key: String,
        message: String,
    },
}

impl StorageError {
    pub(crate) fn gateway(
        operation: &'static str,
        key: impl Into<String>,
        message: impl ToString,
    ) -> Self {
        Self::Gateway {
            operation,
            key: key.into(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create the bucket when it does not exist yet.
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError>;

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;

    async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError>;

    /// A time-limited public URL for the object.
    async fn presigned_link(
        &self,
        bucket: &str,
        key: &str,
        expires_secs: u64,
    ) -> Result<String, StorageError>;
}
