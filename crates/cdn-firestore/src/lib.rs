//! Firestore REST API persistence for the share CDN gateway.
//!
//! This crate provides:
//! - The persistence traits the gateway consumes
//! - Repositories for shares, files, rendition records and request counters
//! - Service account authentication via gcp_auth, or the emulator
//! - An in-memory implementation of every trait

pub mod auth;
pub mod client;
pub mod error;
pub mod file_repo;
pub mod memory;
pub mod metrics;
pub mod request_counter_repo;
pub mod share_repo;
pub mod store;
pub mod transform_cache_repo;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use file_repo::FileRepository;
pub use memory::MemoryStore;
pub use request_counter_repo::RequestCounterRepository;
pub use share_repo::ShareRepository;
pub use store::{FileStore, RequestCounterStore, ShareStore, TransformCacheStore};
pub use transform_cache_repo::TransformCacheRepository;
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
