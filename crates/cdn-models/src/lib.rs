//! Shared data models for the share CDN gateway.
//!
//! This crate provides Serde-serializable types for:
//! - Share links and their access policy
//! - Source file metadata
//! - The transform descriptor grammar and its cache key
//! - Materialized rendition records

pub mod file;
pub mod format;
pub mod share;
pub mod transform;
pub mod transform_cache;

// Re-export common types
pub use file::FileRecord;
pub use format::{CropMode, OutputFormat};
pub use share::{generate_share_token, is_valid_share_token, Share, ALLOW_ALL_TRANSFORMS};
pub use transform::{is_original_alias, processors, TransformDescriptor, TransformError};
pub use transform_cache::{cache_document_id, TransformCacheRecord};
