//! In-process implementation of every persistence trait.
//!
//! Used by tests and by `PERSISTENCE_BACKEND=memory` local runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use cdn_models::{cache_document_id, FileRecord, Share, TransformCacheRecord};

use crate::error::{FirestoreError, FirestoreResult};
use crate::store::{FileStore, RequestCounterStore, ShareStore, TransformCacheStore};

#[derive(Default)]
pub struct MemoryStore {
    shares: RwLock<HashMap<String, Share>>,
    files: RwLock<HashMap<String, FileRecord>>,
    cache: RwLock<HashMap<String, TransformCacheRecord>>,
    counters: RwLock<HashMap<String, u64>>,
    fail_counters: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_share(&self, share: Share) {
        self.shares.write().await.insert(share.token.clone(), share);
    }

    pub async fn insert_file(&self, file: FileRecord) {
        self.files.write().await.insert(file.id.clone(), file);
    }

    pub async fn share(&self, token: &str) -> Option<Share> {
        self.shares.read().await.get(token).cloned()
    }

    pub async fn cached(&self, file_id: &str, cache_key: &str) -> Option<TransformCacheRecord> {
        self.cache
            .read()
            .await
            .get(&cache_document_id(file_id, cache_key))
            .cloned()
    }

    pub async fn cache_len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn request_count(&self, file_id: &str, cache_key: &str) -> u64 {
        self.counters
            .read()
            .await
            .get(&cache_document_id(file_id, cache_key))
            .copied()
            .unwrap_or(0)
    }

    /// Make subsequent counter increments fail.
    pub fn set_fail_request_counter(&self, fail: bool) {
        self.fail_counters.store(fail, Ordering::SeqCst);
    }

    async fn bump_share(&self, token: &str, bump: impl FnOnce(&mut Share)) -> FirestoreResult<()> {
        let mut shares = self.shares.write().await;
        let share = shares
            .get_mut(token)
            .ok_or_else(|| FirestoreError::not_found(format!("shares/{}", token)))?;
        bump(share);
        Ok(())
    }
}

#[async_trait]
impl ShareStore for MemoryStore {
    async fn get_share_by_token(&self, token: &str) -> FirestoreResult<Option<Share>> {
        Ok(self.share(token).await)
    }

    async fn increment_access_count(&self, token: &str) -> FirestoreResult<()> {
        self.bump_share(token, |s| s.access_count += 1).await
    }

    async fn increment_download_count(&self, token: &str) -> FirestoreResult<()> {
        self.bump_share(token, |s| s.download_count += 1).await
    }
}

#[async_trait]
impl FileStore for MemoryStore {
    async fn get_file(&self, file_id: &str) -> FirestoreResult<Option<FileRecord>> {
        Ok(self.files.read().await.get(file_id).cloned())
    }
}

#[async_trait]
impl TransformCacheStore for MemoryStore {
    async fn get_cached(
        &self,
        file_id: &str,
        cache_key: &str,
    ) -> FirestoreResult<Option<TransformCacheRecord>> {
        Ok(self.cached(file_id, cache_key).await)
    }

    async fn put_cached(&self, record: &TransformCacheRecord) -> FirestoreResult<()> {
        let mut cache = self.cache.write().await;
        let id = record.document_id();
        if cache.contains_key(&id) {
            return Err(FirestoreError::AlreadyExists(id));
        }
        cache.insert(id, record.clone());
        Ok(())
    }

    async fn record_hit(&self, file_id: &str, cache_key: &str) -> FirestoreResult<()> {
        let id = cache_document_id(file_id, cache_key);
        let mut cache = self.cache.write().await;
        let record = cache
            .get_mut(&id)
            .ok_or_else(|| FirestoreError::not_found(id.clone()))?;
        record.request_count += 1;
        record.last_accessed_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl RequestCounterStore for MemoryStore {
    async fn increment_request_count(
        &self,
        file_id: &str,
        cache_key: &str,
    ) -> FirestoreResult<u64> {
        if self.fail_counters.load(Ordering::SeqCst) {
            return Err(FirestoreError::ServerError(503, "injected failure".to_string()));
        }
        let mut counters = self.counters.write().await;
        let count = counters
            .entry(cache_document_id(file_id, cache_key))
            .or_insert(0);
        *count += 1;
        Ok(*count)
    }
}
