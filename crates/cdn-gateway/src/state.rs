//! Application state.

use std::sync::Arc;

use cdn_firestore::{
    FileRepository, FileStore, FirestoreClient, MemoryStore, RequestCounterRepository,
    RequestCounterStore, ShareRepository, ShareStore, TransformCacheRepository,
    TransformCacheStore,
};
use cdn_processor::ProcessorRegistry;
use cdn_storage::ObjectStore;

use crate::config::ApiConfig;
use crate::services::{AdaptiveCache, ShareAuthorizer, TelemetryDispatcher};

/// Persistence collaborators, one per concern.
#[derive(Clone)]
pub struct Stores {
    pub shares: Arc<dyn ShareStore>,
    pub files: Arc<dyn FileStore>,
    pub transform_cache: Arc<dyn TransformCacheStore>,
    pub request_counters: Arc<dyn RequestCounterStore>,
}

impl Stores {
    /// Every concern served by one in-memory store.
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            shares: Arc::clone(&store) as Arc<dyn ShareStore>,
            files: Arc::clone(&store) as Arc<dyn FileStore>,
            transform_cache: Arc::clone(&store) as Arc<dyn TransformCacheStore>,
            request_counters: store as Arc<dyn RequestCounterStore>,
        }
    }

    /// Firestore repositories sharing one client.
    pub fn firestore(client: FirestoreClient) -> Self {
        Self {
            shares: Arc::new(ShareRepository::new(client.clone())),
            files: Arc::new(FileRepository::new(client.clone())),
            transform_cache: Arc::new(TransformCacheRepository::new(client.clone())),
            request_counters: Arc::new(RequestCounterRepository::new(client)),
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub files: Arc<dyn FileStore>,
    pub shares: Arc<dyn ShareStore>,
    pub storage: Arc<dyn ObjectStore>,
    pub processors: Arc<ProcessorRegistry>,
    pub telemetry: TelemetryDispatcher,
    pub authorizer: ShareAuthorizer,
    pub cache: AdaptiveCache,
}

impl AppState {
    pub fn new(
        config: ApiConfig,
        stores: Stores,
        storage: Arc<dyn ObjectStore>,
        processors: ProcessorRegistry,
    ) -> Self {
        let telemetry =
            TelemetryDispatcher::new(config.telemetry_max_in_flight, config.telemetry_timeout);
        let authorizer = ShareAuthorizer::new(Arc::clone(&stores.shares), telemetry.clone());
        let cache = AdaptiveCache::new(
            stores.transform_cache,
            stores.request_counters,
            Arc::clone(&storage),
            config.cache_promotion_threshold,
        );

        Self {
            config,
            files: stores.files,
            shares: stores.shares,
            storage,
            processors: Arc::new(processors),
            telemetry,
            authorizer,
            cache,
        }
    }
}
