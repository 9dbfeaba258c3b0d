//! Shared harness for gateway end-to-end tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use tower::ServiceExt;

use cdn_firestore::MemoryStore;
use cdn_gateway::{create_router, ApiConfig, AppState, Stores};
use cdn_models::{processors, FileRecord, Share};
use cdn_processor::{
    ProcessOptions, ProcessedOutput, Processor, ProcessorError, ProcessorRegistry, ProcessorResult,
};
use cdn_storage::{MemoryObjectStore, ObjectStore};

pub const IMAGE_FILE_ID: &str = "file-image";
pub const IMAGE_KEY: &str = "files/file-image/photo.jpg";
pub const ARCHIVE_FILE_ID: &str = "file-archive";
pub const ARCHIVE_KEY: &str = "files/file-archive/bundle.zip";
pub const DOCUMENT_FILE_ID: &str = "file-document";
pub const DOCUMENT_KEY: &str = "files/file-document/report.pdf";

pub const ALL_PROCESSORS: &[&str] = &[
    processors::RESIZE,
    processors::THUMBNAIL,
    processors::WATERMARK,
    processors::DOCUMENT,
    processors::WEBP,
    processors::AVIF,
];

/// Processor that echoes the canonical transform and counts calls.
pub struct FakeProcessor {
    name: &'static str,
    calls: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
}

#[async_trait]
impl Processor for FakeProcessor {
    fn name(&self) -> &str {
        self.name
    }

    async fn process(&self, options: &ProcessOptions, input: Bytes) -> ProcessorResult<ProcessedOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProcessorError::ServiceUnavailable("engine offline".to_string()));
        }

        let body = format!("{}:{}:{}", self.name, options.descriptor, input.len());
        let mut output = ProcessedOutput::new(body.into_bytes(), "image/jpeg");
        if let Some(w) = options.descriptor.width {
            output = output.with_metadata("width", w);
        }
        if let Some(h) = options.descriptor.height {
            output = output.with_metadata("height", h);
        }
        Ok(output)
    }
}

pub struct Harness {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub objects: Arc<MemoryObjectStore>,
    pub processor_calls: Arc<AtomicUsize>,
    pub processor_fail: Arc<AtomicBool>,
}

pub fn test_config() -> ApiConfig {
    ApiConfig {
        rate_limit_rps: 1000,
        telemetry_timeout: Duration::from_secs(2),
        ..ApiConfig::default()
    }
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: ApiConfig) -> Self {
        Self::with_processors(config, ALL_PROCESSORS).await
    }

    /// Harness whose registry only knows `names`.
    pub async fn with_processors(config: ApiConfig, names: &[&'static str]) -> Self {
        let store = Arc::new(MemoryStore::new());
        let objects = Arc::new(MemoryObjectStore::default());
        let processor_calls = Arc::new(AtomicUsize::new(0));
        let processor_fail = Arc::new(AtomicBool::new(false));

        let mut registry = ProcessorRegistry::new();
        for &name in names {
            registry.register(Arc::new(FakeProcessor {
                name,
                calls: Arc::clone(&processor_calls),
                fail: Arc::clone(&processor_fail),
            }));
        }

        let updated_at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        store
            .insert_file(
                FileRecord::new(IMAGE_FILE_ID, IMAGE_KEY, "image/jpeg")
                    .with_size(6)
                    .with_name("photo.jpg")
                    .with_updated_at(updated_at),
            )
            .await;
        store
            .insert_file(
                FileRecord::new(ARCHIVE_FILE_ID, ARCHIVE_KEY, "application/zip")
                    .with_size(7)
                    .with_name("bundle.zip")
                    .with_updated_at(updated_at),
            )
            .await;
        store
            .insert_file(
                FileRecord::new(DOCUMENT_FILE_ID, DOCUMENT_KEY, "application/pdf")
                    .with_size(8)
                    .with_name("report.pdf")
                    .with_updated_at(updated_at),
            )
            .await;
        objects.insert(IMAGE_KEY, &b"jpegzz"[..], "image/jpeg").await;
        objects.insert(ARCHIVE_KEY, &b"zipdata"[..], "application/zip").await;
        objects.insert(DOCUMENT_KEY, &b"%PDF-1.7"[..], "application/pdf").await;

        let state = AppState::new(
            config,
            Stores::memory(Arc::clone(&store)),
            Arc::clone(&objects) as Arc<dyn ObjectStore>,
            registry,
        );
        let router = create_router(state.clone(), None);

        Self {
            router,
            state,
            store,
            objects,
            processor_calls,
            processor_fail,
        }
    }

    /// Seed a share and return its token.
    pub async fn share(&self, share: Share) -> String {
        let token = share.token.clone();
        self.store.insert_share(share).await;
        token
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn get_with(&self, uri: &str, headers: &[(&str, &str)]) -> TestResponse {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Let background counter updates land.
    pub async fn settle(&self) {
        assert!(self.state.telemetry.drain(Duration::from_secs(2)).await);
    }

    pub fn processor_calls(&self) -> usize {
        self.processor_calls.load(Ordering::SeqCst)
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}
