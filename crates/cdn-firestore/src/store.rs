//! Persistence interfaces consumed by the gateway.
//!
//! Every method is a single round-trip; none retries.

use async_trait::async_trait;

use cdn_models::{FileRecord, Share, TransformCacheRecord};

use crate::error::FirestoreResult;

/// Share lookup and counters, keyed by the public token.
#[async_trait]
pub trait ShareStore: Send + Sync {
    async fn get_share_by_token(&self, token: &str) -> FirestoreResult<Option<Share>>;

    async fn increment_access_count(&self, token: &str) -> FirestoreResult<()>;

    async fn increment_download_count(&self, token: &str) -> FirestoreResult<()>;

    /// Cheap round-trip used by readiness probes.
    async fn check_connectivity(&self) -> FirestoreResult<()> {
        Ok(())
    }
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn get_file(&self, file_id: &str) -> FirestoreResult<Option<FileRecord>>;
}

/// Rendition metadata keyed by `(file_id, cache_key)`.
#[async_trait]
pub trait TransformCacheStore: Send + Sync {
    async fn get_cached(
        &self,
        file_id: &str,
        cache_key: &str,
    ) -> FirestoreResult<Option<TransformCacheRecord>>;

    /// Create-only write. A record already present for the pair yields
    /// [`FirestoreError::AlreadyExists`](crate::FirestoreError::AlreadyExists).
    async fn put_cached(&self, record: &TransformCacheRecord) -> FirestoreResult<()>;

    /// Bump `request_count` and touch `last_accessed_at`.
    async fn record_hit(&self, file_id: &str, cache_key: &str) -> FirestoreResult<()>;
}

/// Per-`(file_id, cache_key)` counter of processing-path requests.
#[async_trait]
pub trait RequestCounterStore: Send + Sync {
    /// Atomically increment and return the post-increment count.
    async fn increment_request_count(&self, file_id: &str, cache_key: &str)
        -> FirestoreResult<u64>;
}
