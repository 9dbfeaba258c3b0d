//! Adaptive rendition cache.
//!
//! Renditions are materialized on every miss but only persisted once the
//! `(file, cache key)` pair has been requested `threshold` times on the
//! processing path. Hits never re-evaluate promotion.

use std::sync::Arc;

use tracing::{debug, info, warn};

use cdn_firestore::{RequestCounterStore, TransformCacheStore};
use cdn_models::{TransformCacheRecord, TransformDescriptor};
use cdn_processor::ProcessedOutput;
use cdn_storage::{rendition_key, ObjectStore};

use crate::error::ApiResult;
use crate::metrics;

#[derive(Clone)]
pub struct AdaptiveCache {
    records: Arc<dyn TransformCacheStore>,
    counters: Arc<dyn RequestCounterStore>,
    storage: Arc<dyn ObjectStore>,
    threshold: u64,
}

impl AdaptiveCache {
    pub fn new(
        records: Arc<dyn TransformCacheStore>,
        counters: Arc<dyn RequestCounterStore>,
        storage: Arc<dyn ObjectStore>,
        threshold: u64,
    ) -> Self {
        Self {
            records,
            counters,
            storage,
            threshold: threshold.max(1),
        }
    }

    /// Store used for background hit accounting.
    pub fn records(&self) -> Arc<dyn TransformCacheStore> {
        Arc::clone(&self.records)
    }

    pub async fn lookup(
        &self,
        file_id: &str,
        cache_key: &str,
    ) -> ApiResult<Option<TransformCacheRecord>> {
        let record = self.records.get_cached(file_id, cache_key).await?;
        metrics::record_cache_lookup(record.is_some());
        Ok(record)
    }

    /// Count this processing-path request and decide whether its output is
    /// persisted. Counter failures mean "do not promote".
    pub async fn should_promote(&self, file_id: &str, cache_key: &str) -> bool {
        match self.counters.increment_request_count(file_id, cache_key).await {
            Ok(count) => {
                debug!(file_id = %file_id, cache_key = %cache_key, count, "Counted transform request");
                count >= self.threshold
            }
            Err(e) => {
                warn!(file_id = %file_id, cache_key = %cache_key, error = %e, "Request counter failed, not promoting");
                false
            }
        }
    }

    /// Persist a rendition and its metadata. A record written concurrently by
    /// another request for the same key counts as success.
    pub async fn store(
        &self,
        file_id: &str,
        cache_key: &str,
        descriptor: &TransformDescriptor,
        output: &ProcessedOutput,
    ) -> ApiResult<TransformCacheRecord> {
        let key = rendition_key(file_id, cache_key);
        self.storage
            .upload(&key, output.data.clone(), &output.content_type, output.size())
            .await?;

        let record = TransformCacheRecord::new(
            file_id,
            cache_key,
            key,
            output.content_type.clone(),
            output.size(),
        )
        .with_descriptor(descriptor.to_string())
        .with_dimensions(output.width(), output.height());

        match self.records.put_cached(&record).await {
            Ok(()) => {
                metrics::record_cache_promotion();
                info!(
                    file_id = %file_id,
                    cache_key = %cache_key,
                    size_bytes = record.size_bytes,
                    "Promoted rendition to cache"
                );
                Ok(record)
            }
            Err(e) if e.is_already_exists() => {
                debug!(file_id = %file_id, cache_key = %cache_key, "Rendition already cached by a concurrent request");
                Ok(record)
            }
            Err(e) => Err(e.into()),
        }
    }
}
