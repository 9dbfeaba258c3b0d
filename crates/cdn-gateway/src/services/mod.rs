//! Domain services sequenced by the CDN handler.

pub mod delivery;
pub mod share_auth;
pub mod telemetry;
pub mod transform_cache;

pub use share_auth::ShareAuthorizer;
pub use telemetry::TelemetryDispatcher;
pub use transform_cache::AdaptiveCache;
