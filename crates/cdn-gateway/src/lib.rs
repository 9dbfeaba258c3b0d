//! Token-gated media transform gateway.
//!
//! This crate provides:
//! - Share authorization (expiry, password, download ceiling, transform allow-list)
//! - Adaptive promotion of processed renditions into a durable cache
//! - Conditional delivery with ETags, tiered Cache-Control and presigned redirects
//! - Rate limiting, security headers and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{AdaptiveCache, ShareAuthorizer, TelemetryDispatcher};
pub use state::{AppState, Stores};
