//! Stored file metadata read by the gateway.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Metadata of an uploaded file that shares point at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FileRecord {
    pub id: String,

    /// Object storage key of the source bytes.
    pub storage_key: String,

    /// MIME type recorded at upload.
    pub content_type: String,

    #[serde(default)]
    pub size_bytes: u64,

    /// Original file name as uploaded.
    #[serde(default)]
    pub name: String,

    /// Last content change; feeds the ETag of the unmodified file.
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn new(
        id: impl Into<String>,
        storage_key: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            storage_key: storage_key.into(),
            content_type: content_type.into(),
            size_bytes: 0,
            name: String::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = updated_at;
        self
    }
}
