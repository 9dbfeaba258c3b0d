//! Share CDN gateway binary.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cdn_firestore::{FirestoreClient, MemoryStore};
use cdn_gateway::config::{PersistenceBackend, StorageBackend};
use cdn_gateway::{create_router, metrics, ApiConfig, AppState, Stores};
use cdn_processor::{http_registry, ProcessorClientConfig};
use cdn_storage::{MemoryObjectStore, ObjectStore, R2Client, R2Config};

/// Bounded wait for background counter updates at shutdown.
const TELEMETRY_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // rustls 0.23+ needs an explicit process-wide provider
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("failed to install rustls crypto provider"))?;

    init_tracing()?;

    info!("Starting cdn-gateway");

    let config = ApiConfig::from_env().map_err(|e| anyhow!(e))?;
    info!(
        host = %config.host,
        port = config.port,
        environment = %config.environment,
        storage = ?config.storage_backend,
        persistence = ?config.persistence_backend,
        promotion_threshold = config.cache_promotion_threshold,
        "Gateway config loaded"
    );

    let storage: Arc<dyn ObjectStore> = match config.storage_backend {
        StorageBackend::R2 => {
            let r2 = R2Config::from_env().context("R2 configuration")?;
            Arc::new(R2Client::new(r2))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory object storage; nothing is persisted");
            Arc::new(MemoryObjectStore::default())
        }
    };

    let stores = match config.persistence_backend {
        PersistenceBackend::Firestore => {
            Stores::firestore(FirestoreClient::from_env().context("Firestore client")?)
        }
        PersistenceBackend::Memory => {
            warn!("Using in-memory persistence; shares must be seeded in-process");
            Stores::memory(Arc::new(MemoryStore::new()))
        }
    };

    let processor_config = ProcessorClientConfig::from_env();
    let processors = http_registry(&processor_config).context("processor registry")?;
    info!(
        url = %processor_config.base_url,
        processors = ?processors.names(),
        "Processor registry ready"
    );

    let metrics_handle = if config.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics().context("Prometheus recorder")?)
    } else {
        None
    };

    let state = AppState::new(config.clone(), stores, storage, processors);
    let telemetry = state.telemetry.clone();
    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid bind address")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    info!(in_flight = telemetry.in_flight(), "Draining telemetry");
    if !telemetry.drain(TELEMETRY_DRAIN_TIMEOUT).await {
        warn!("Telemetry drain incomplete; some counters were not recorded");
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Colored output for dev, JSON when `LOG_FORMAT=json`.
fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("cdn=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for CTRL+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Received shutdown signal");
}
