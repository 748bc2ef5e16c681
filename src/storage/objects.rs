//! In-memory object store

use crate::core::error::{AppError, Result};
use crate::core::object_store::ObjectStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

type Objects = HashMap<(String, String), Vec<u8>>;

/// Object store keeping blobs in a shared map
///
/// Cloning shares the underlying objects. URLs are `<base_url>/<bucket>/<key>`.
#[derive(Clone)]
pub struct InMemoryObjectStore {
    objects: Arc<RwLock<Objects>>,
    base_url: String,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make every following call fail, as an unreachable server would
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .ok()?
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.get(bucket, key).is_some()
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Internal("object store unavailable".to_string()));
        }
        Ok(())
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Objects>> {
        self.objects
            .write()
            .map_err(|e| AppError::Internal(format!("failed to acquire write lock: {}", e)))
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new("memory://objects")
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn upload(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<String> {
        self.ensure_available()?;
        self.write()?
            .insert((bucket.to_string(), key.to_string()), bytes);
        tracing::debug!(bucket, key, "object uploaded");
        Ok(format!("{}/{}/{}", self.base_url, bucket, key))
    }

    async fn relocate(&self, source: &str, key: &str, destination: &str) -> Result<()> {
        self.ensure_available()?;
        let mut objects = self.write()?;
        match objects.remove(&(source.to_string(), key.to_string())) {
            Some(bytes) => {
                objects.insert((destination.to_string(), key.to_string()), bytes);
                tracing::debug!(source, destination, key, "object relocated");
            }
            None => {
                tracing::warn!(source, destination, key, "object to relocate not found in source");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::object_store::{FIRMWARE_BUCKET, TRASH_BUCKET};

    #[tokio::test]
    async fn test_upload_returns_url() {
        let store = InMemoryObjectStore::new("http://minio:9000/");
        let url = store
            .upload(FIRMWARE_BUCKET, "ax3000/v1.2", vec![7; 4])
            .await
            .unwrap();
        assert_eq!(url, "http://minio:9000/firmware/ax3000/v1.2");
        assert_eq!(store.get(FIRMWARE_BUCKET, "ax3000/v1.2"), Some(vec![7; 4]));
    }

    #[tokio::test]
    async fn test_relocate_is_idempotent() {
        let store = InMemoryObjectStore::default();
        store.upload(FIRMWARE_BUCKET, "m/f", vec![1]).await.unwrap();

        store.relocate(FIRMWARE_BUCKET, "m/f", TRASH_BUCKET).await.unwrap();
        store.relocate(FIRMWARE_BUCKET, "m/f", TRASH_BUCKET).await.unwrap();

        assert!(!store.contains(FIRMWARE_BUCKET, "m/f"));
        assert!(store.contains(TRASH_BUCKET, "m/f"));
    }

    #[tokio::test]
    async fn test_unavailable_store_fails() {
        let store = InMemoryObjectStore::default();
        store.set_unavailable(true);
        assert!(store.upload(FIRMWARE_BUCKET, "m/f", vec![1]).await.is_err());
    }
}
