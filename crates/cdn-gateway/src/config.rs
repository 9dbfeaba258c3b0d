//! Gateway configuration.

use std::str::FromStr;
use std::time::Duration;

use cdn_storage::MAX_PRESIGN_TTL;

/// Where source files and renditions live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    R2,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "r2" => Ok(Self::R2),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown STORAGE_BACKEND '{}'", other)),
        }
    }
}

/// Where shares, files and cache metadata live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceBackend {
    Firestore,
    Memory,
}

impl FromStr for PersistenceBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(Self::Firestore),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown PERSISTENCE_BACKEND '{}'", other)),
        }
    }
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Per-IP requests per second on `/cdn`
    pub rate_limit_rps: u32,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Expose `/metrics`
    pub metrics_enabled: bool,
    /// Processing-path requests before a rendition is persisted
    pub cache_promotion_threshold: u64,
    /// Lifetime of redirect URLs
    pub presign_ttl: Duration,
    /// Upper bound on one background counter update
    pub telemetry_timeout: Duration,
    /// Background counter updates allowed in flight
    pub telemetry_max_in_flight: usize,
    pub storage_backend: StorageBackend,
    pub persistence_backend: PersistenceBackend,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 20,
            max_body_size: 64 * 1024, // GET-only surface
            environment: "development".to_string(),
            metrics_enabled: true,
            cache_promotion_threshold: 3,
            presign_ttl: Duration::from_secs(900),
            telemetry_timeout: Duration::from_secs(5),
            telemetry_max_in_flight: 256,
            storage_backend: StorageBackend::R2,
            persistence_backend: PersistenceBackend::Firestore,
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        Ok(Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parse("API_PORT").unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: env_parse("RATE_LIMIT_RPS").unwrap_or(defaults.rate_limit_rps),
            max_body_size: env_parse("MAX_BODY_SIZE").unwrap_or(defaults.max_body_size),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.metrics_enabled),
            cache_promotion_threshold: env_parse("CACHE_PROMOTION_THRESHOLD")
                .filter(|t: &u64| *t > 0)
                .unwrap_or(defaults.cache_promotion_threshold),
            presign_ttl: env_parse("PRESIGN_TTL_SECS")
                .map(|secs: u64| Duration::from_secs(secs).min(MAX_PRESIGN_TTL))
                .unwrap_or(defaults.presign_ttl),
            telemetry_timeout: env_parse("TELEMETRY_TIMEOUT_SECS")
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.telemetry_timeout),
            telemetry_max_in_flight: env_parse("TELEMETRY_MAX_IN_FLIGHT")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.telemetry_max_in_flight),
            storage_backend: match std::env::var("STORAGE_BACKEND") {
                Ok(v) => v.parse()?,
                Err(_) => defaults.storage_backend,
            },
            persistence_backend: match std::env::var("PERSISTENCE_BACKEND") {
                Ok(v) => v.parse()?,
                Err(_) => defaults.persistence_backend,
            },
        })
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "PRESIGN_TTL_SECS",
        "CACHE_PROMOTION_THRESHOLD",
        "STORAGE_BACKEND",
        "PERSISTENCE_BACKEND",
        "RATE_LIMIT_RPS",
        "TELEMETRY_TIMEOUT_SECS",
    ];

    fn clear() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear();
        let config = ApiConfig::from_env().unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.rate_limit_rps, 20);
        assert_eq!(config.cache_promotion_threshold, 3);
        assert_eq!(config.presign_ttl, Duration::from_secs(900));
        assert_eq!(config.telemetry_max_in_flight, 256);
        assert_eq!(config.storage_backend, StorageBackend::R2);
        assert_eq!(config.persistence_backend, PersistenceBackend::Firestore);
    }

    #[test]
    #[serial]
    fn test_presign_ttl_capped_at_seven_days() {
        clear();
        std::env::set_var("PRESIGN_TTL_SECS", "99999999");
        let config = ApiConfig::from_env().unwrap();
        assert_eq!(config.presign_ttl, Duration::from_secs(604_800));
        clear();
    }

    #[test]
    #[serial]
    fn test_zero_threshold_falls_back_to_default() {
        clear();
        std::env::set_var("CACHE_PROMOTION_THRESHOLD", "0");
        assert_eq!(ApiConfig::from_env().unwrap().cache_promotion_threshold, 3);
        clear();
    }

    #[test]
    #[serial]
    fn test_zero_telemetry_timeout_falls_back_to_default() {
        clear();
        std::env::set_var("TELEMETRY_TIMEOUT_SECS", "0");
        assert_eq!(
            ApiConfig::from_env().unwrap().telemetry_timeout,
            Duration::from_secs(5)
        );

        std::env::set_var("TELEMETRY_TIMEOUT_SECS", "12");
        assert_eq!(
            ApiConfig::from_env().unwrap().telemetry_timeout,
            Duration::from_secs(12)
        );
        clear();
    }

    #[test]
    #[serial]
    fn test_backends() {
        clear();
        std::env::set_var("STORAGE_BACKEND", "Memory");
        std::env::set_var("PERSISTENCE_BACKEND", "memory");
        let config = ApiConfig::from_env().unwrap();
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert_eq!(config.persistence_backend, PersistenceBackend::Memory);

        std::env::set_var("STORAGE_BACKEND", "gcs");
        assert!(ApiConfig::from_env().is_err());
        clear();
    }
}
