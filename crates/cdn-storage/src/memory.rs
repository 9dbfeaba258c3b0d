//! In-process object store for tests and local runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::error::{StorageError, StorageResult};
use crate::store::{clamp_presign_ttl, ObjectStore};

/// A stored object and its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: String,
    pub size: u64,
}

/// `HashMap`-backed [`ObjectStore`] that records call counts.
///
/// Presigned URLs have the form `{base_url}/{key}?expires={secs}`.
pub struct MemoryObjectStore {
    base_url: String,
    objects: RwLock<HashMap<String, StoredObject>>,
    downloads: AtomicUsize,
    uploads: AtomicUsize,
    presigns: AtomicUsize,
    fail_uploads: AtomicBool,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new("memory://objects")
    }
}

impl MemoryObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: RwLock::new(HashMap::new()),
            downloads: AtomicUsize::new(0),
            uploads: AtomicUsize::new(0),
            presigns: AtomicUsize::new(0),
            fail_uploads: AtomicBool::new(false),
        }
    }

    /// Seed an object without counting it as an upload.
    pub async fn insert(&self, key: impl Into<String>, data: impl Into<Bytes>, content_type: &str) {
        let data = data.into();
        let object = StoredObject {
            size: data.len() as u64,
            data,
            content_type: content_type.to_string(),
        };
        self.objects.write().await.insert(key.into(), object);
    }

    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn presign_count(&self) -> usize {
        self.presigns.load(Ordering::SeqCst)
    }

    /// Make subsequent uploads fail with [`StorageError::UploadFailed`].
    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn download(&self, key: &str) -> StorageResult<Bytes> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.objects
            .read()
            .await
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StorageError::not_found(key))
    }

    async fn upload(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        size: u64,
    ) -> StorageResult<()> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::upload_failed(format!("injected failure for {}", key)));
        }
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let object = StoredObject {
            data,
            content_type: content_type.to_string(),
            size,
        };
        self.objects.write().await.insert(key.to_string(), object);
        Ok(())
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey("empty key".to_string()));
        }
        self.presigns.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "{}/{}?expires={}",
            self.base_url,
            key,
            clamp_presign_ttl(ttl).as_secs()
        ))
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        Ok(())
    }
}
