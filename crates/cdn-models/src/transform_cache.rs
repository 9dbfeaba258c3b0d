//! Materialized rendition metadata.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One persisted rendition, keyed by `(file_id, cache_key)`.
///
/// Immutable once written apart from `request_count` and `last_accessed_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TransformCacheRecord {
    pub file_id: String,
    pub cache_key: String,

    /// Canonical descriptor string the rendition was produced from.
    #[serde(default)]
    pub descriptor: String,

    /// Object storage key of the rendition bytes.
    pub storage_key: String,
    pub content_type: String,
    pub size_bytes: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    /// Times this rendition was served from cache.
    #[serde(default)]
    pub request_count: u64,

    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl TransformCacheRecord {
    pub fn new(
        file_id: impl Into<String>,
        cache_key: impl Into<String>,
        storage_key: impl Into<String>,
        content_type: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            file_id: file_id.into(),
            cache_key: cache_key.into(),
            descriptor: String::new(),
            storage_key: storage_key.into(),
            content_type: content_type.into(),
            size_bytes,
            width: None,
            height: None,
            request_count: 0,
            created_at: now,
            last_accessed_at: now,
        }
    }

    pub fn with_descriptor(mut self, descriptor: impl Into<String>) -> Self {
        self.descriptor = descriptor.into();
        self
    }

    pub fn with_dimensions(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Document ID used by persistence layers: `{file_id}_{cache_key}`.
    pub fn document_id(&self) -> String {
        cache_document_id(&self.file_id, &self.cache_key)
    }
}

/// Compose the persistence ID for a `(file_id, cache_key)` pair.
pub fn cache_document_id(file_id: &str, cache_key: &str) -> String {
    format!("{}_{}", file_id, cache_key)
}
