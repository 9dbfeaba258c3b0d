//! Object storage abstraction consumed by the gateway.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageResult;

/// Upper bound on presigned URL lifetime accepted by S3-compatible stores.
pub const MAX_PRESIGN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Byte storage for source files and renditions.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object's full contents.
    async fn download(&self, key: &str) -> StorageResult<Bytes>;

    /// Write an object, replacing any existing one at the key.
    async fn upload(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        size: u64,
    ) -> StorageResult<()>;

    /// Produce a time-limited GET URL. TTLs above [`MAX_PRESIGN_TTL`] are clamped.
    async fn presign_get(&self, key: &str, ttl: Duration) -> StorageResult<String>;

    /// Cheap round-trip used by readiness probes.
    async fn check_connectivity(&self) -> StorageResult<()>;
}

/// Clamp a requested presign TTL to what the backend accepts.
pub fn clamp_presign_ttl(ttl: Duration) -> Duration {
    ttl.min(MAX_PRESIGN_TTL).max(Duration::from_secs(1))
}
