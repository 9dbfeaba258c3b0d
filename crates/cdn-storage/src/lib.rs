//! Object storage for source files and cached renditions.
//!
//! This crate provides:
//! - The [`ObjectStore`] abstraction the gateway consumes
//! - A Cloudflare R2 (S3 API) implementation with presigned GETs
//! - An in-memory implementation for tests and local runs
//! - The rendition key layout

pub mod client;
pub mod error;
pub mod keys;
pub mod memory;
pub mod store;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use keys::{rendition_key, rendition_prefix, TRANSFORMS_PREFIX};
pub use memory::{MemoryObjectStore, StoredObject};
pub use store::{clamp_presign_ttl, ObjectStore, MAX_PRESIGN_TTL};
