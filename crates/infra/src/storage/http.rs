//! Client for the object-storage HTTP gateway.
//!
//! The gateway fronts the actual blob store with a plain REST surface:
//! `PUT /buckets/{bucket}` creates a bucket, `PUT/GET/DELETE
//! /objects/{bucket}/{key}` move bytes, and
//! `GET /objects/{bucket}/{key}/link?expires_secs=…` mints a presigned URL
//! (returned as the response body).

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use super::{ObjectStore, StorageError};

pub struct HttpObjectStore {
    client: Client,
    base_url: String,
}

impl HttpObjectStore {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("failed to create HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/objects/{}/{}", self.base_url, bucket, key)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        let url = format!("{}/buckets/{}", self.base_url, bucket);
        let response = self
            .client
            .put(&url)
            .send()
            .await
            .map_err(|e| StorageError::gateway("ensure_bucket", bucket, e))?;
        if !response.status().is_success() {
            return Err(StorageError::gateway(
                "ensure_bucket",
                bucket,
                response.status(),
            ));
        }
        debug!(bucket, "bucket ensured");
        Ok(())
    }

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let size = bytes.len();
        let response = self
            .client
            .put(self.object_url(bucket, key))
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| StorageError::gateway("upload", key, e))?;
        if !response.status().is_success() {
            return Err(StorageError::gateway("upload", key, response.status()));
        }
        debug!(bucket, key, size, "object uploaded");
        Ok(())
    }

    async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self
            .client
            .get(self.object_url(bucket, key))
            .send()
            .await
            .map_err(|e| StorageError::gateway("download", key, e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound {
                key: key.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(StorageError::gateway("download", key, response.status()));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| StorageError::gateway("download", key, e))?;
        Ok(bytes.to_vec())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let response = self
            .client
            .delete(self.object_url(bucket, key))
            .send()
            .await
            .map_err(|e| StorageError::gateway("delete", key, e))?;
        if !response.status().is_success() {
            return Err(StorageError::gateway("delete", key, response.status()));
        }
        Ok(())
    }

    async fn presigned_link(
        &self,
        bucket: &str,
        key: &str,
        expires_secs: u64,
    ) -> Result<String, StorageError> {
        let url = format!(
            "{}/link?expires_secs={}",
            self.object_url(bucket, key),
            expires_secs
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| StorageError::gateway("presigned_link", key, e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound {
                key: key.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(StorageError::gateway(
                "presigned_link",
                key,
                response.status(),
            ));
        }
        response
            .text()
            .await
            .map_err(|e| StorageError::gateway("presigned_link", key, e))
    }
}
