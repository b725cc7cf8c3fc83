use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use super::{ObjectStore, StorageError};

/// In-memory object store for tests.
///
/// Links are deterministic `memory://` URLs so assertions can predict them.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    buckets: RwLock<HashSet<String>>,
    objects: RwLock<HashMap<(String, String), StoredObject>>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .read()
            .map(|objects| objects.contains_key(&(bucket.to_string(), key.to_string())))
            .unwrap_or(false)
    }

    pub fn content_type_of(&self, bucket: &str, key: &str) -> Option<String> {
        self.objects
            .read()
            .ok()
            .and_then(|objects| {
                objects
                    .get(&(bucket.to_string(), key.to_string()))
                    .map(|object| object.content_type.clone())
            })
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        let mut buckets = self
            .buckets
            .write()
            .map_err(|_| StorageError::gateway("ensure_bucket", bucket, "lock poisoned"))?;
        buckets.insert(bucket.to_string());
        Ok(())
    }

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let mut objects = self
            .objects
            .write()
            .map_err(|_| StorageError::gateway("upload", key, "lock poisoned"))?;
        objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let objects = self
            .objects
            .read()
            .map_err(|_| StorageError::gateway("download", key, "lock poisoned"))?;
        objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|object| object.bytes.clone())
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let mut objects = self
            .objects
            .write()
            .map_err(|_| StorageError::gateway("delete", key, "lock poisoned"))?;
        objects.remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn presigned_link(
        &self,
        bucket: &str,
        key: &str,
        expires_secs: u64,
    ) -> Result<String, StorageError> {
        if !self.contains(bucket, key) {
            return Err(StorageError::NotFound {
                key: key.to_string(),
            });
        }
        Ok(format!("memory://{bucket}/{key}?expires={expires_secs}"))
    }
}
