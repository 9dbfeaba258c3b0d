//! HTTP client for the external processing service.
//!
//! Each named processor is a route on the service:
//! `POST {base_url}/process/{name}?transform={canonical}` with the source
//! bytes as body. The response body is the rendition; its `Content-Type`
//! header names the output type and `X-Output-*` headers carry metadata.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};

use cdn_models::processors;

use crate::error::{ProcessorError, ProcessorResult};
use crate::processor::{metadata_keys, ProcessOptions, ProcessedOutput, Processor};
use crate::registry::ProcessorRegistry;

const WIDTH_HEADER: &str = "x-output-width";
const HEIGHT_HEADER: &str = "x-output-height";
const FILENAME_HEADER: &str = "x-output-filename";

/// Processor names registered when `PROCESSOR_NAMES` is unset.
pub const DEFAULT_PROCESSOR_NAMES: &[&str] = &[
    processors::RESIZE,
    processors::THUMBNAIL,
    processors::WATERMARK,
    processors::DOCUMENT,
    processors::WEBP,
    processors::AVIF,
];

/// Configuration for the processing service client.
#[derive(Debug, Clone)]
pub struct ProcessorClientConfig {
    /// Base URL of the processing service
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Processor names to register
    pub names: Vec<String>,
}

impl Default for ProcessorClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            timeout: Duration::from_secs(60),
            names: DEFAULT_PROCESSOR_NAMES.iter().map(|n| n.to_string()).collect(),
        }
    }
}

impl ProcessorClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("PROCESSOR_SERVICE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            timeout: std::env::var("PROCESSOR_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            names: std::env::var("PROCESSOR_NAMES")
                .ok()
                .map(|s| {
                    s.split(',')
                        .map(|n| n.trim().to_string())
                        .filter(|n| !n.is_empty())
                        .collect::<Vec<_>>()
                })
                .filter(|names| !names.is_empty())
                .unwrap_or(defaults.names),
        }
    }
}

/// One named route on the processing service.
pub struct HttpProcessor {
    name: String,
    url: String,
    timeout_secs: u64,
    http: Client,
}

impl HttpProcessor {
    pub fn new(name: impl Into<String>, config: &ProcessorClientConfig, http: Client) -> Self {
        let name = name.into();
        Self {
            url: format!("{}/process/{}", config.base_url, name),
            timeout_secs: config.timeout.as_secs(),
            name,
            http,
        }
    }

    fn classify_status(&self, status: StatusCode, body: String) -> ProcessorError {
        let msg = format!("{} returned {}: {}", self.name, status, body);
        match status {
            StatusCode::BAD_REQUEST
            | StatusCode::UNSUPPORTED_MEDIA_TYPE
            | StatusCode::UNPROCESSABLE_ENTITY
            | StatusCode::PAYLOAD_TOO_LARGE => ProcessorError::Rejected(msg),
            StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT => ProcessorError::ServiceUnavailable(msg),
            _ => ProcessorError::RequestFailed(msg),
        }
    }

    async fn into_output(&self, response: Response) -> ProcessorResult<ProcessedOutput> {
        let headers = response.headers().clone();
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        let content_type = header(CONTENT_TYPE.as_str()).ok_or_else(|| {
            ProcessorError::InvalidResponse(format!("{} response has no content type", self.name))
        })?;

        let mut output = ProcessedOutput::new(response.bytes().await?, content_type);
        if let Some(width) = header(WIDTH_HEADER) {
            output = output.with_metadata(metadata_keys::WIDTH, width);
        }
        if let Some(height) = header(HEIGHT_HEADER) {
            output = output.with_metadata(metadata_keys::HEIGHT, height);
        }
        if let Some(filename) = header(FILENAME_HEADER) {
            output = output.with_filename(filename);
        }
        Ok(output)
    }
}

#[async_trait]
impl Processor for HttpProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, options: &ProcessOptions, input: Bytes) -> ProcessorResult<ProcessedOutput> {
        let transform = options.descriptor.to_string();
        debug!(processor = %self.name, transform = %transform, bytes = input.len(), "Sending processing request");

        let response = self
            .http
            .post(&self.url)
            .query(&[("transform", transform.as_str())])
            .header(CONTENT_TYPE, &options.source_content_type)
            .body(input)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProcessorError::Timeout(self.timeout_secs)
                } else {
                    ProcessorError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = self.classify_status(status, body);
            warn!(processor = %self.name, error = %err, "Processing request failed");
            return Err(err);
        }

        self.into_output(response).await
    }
}

/// Build a registry with one [`HttpProcessor`] per configured name, sharing a
/// connection pool.
pub fn http_registry(config: &ProcessorClientConfig) -> ProcessorResult<ProcessorRegistry> {
    if config.base_url.is_empty() {
        return Err(ProcessorError::Config("PROCESSOR_SERVICE_URL is empty".to_string()));
    }

    let http = Client::builder()
        .timeout(config.timeout)
        .user_agent(concat!("cdn-processor/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(ProcessorError::Network)?;

    let mut registry = ProcessorRegistry::new();
    for name in &config.names {
        registry.register(Arc::new(HttpProcessor::new(name.clone(), config, http.clone())));
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdn_models::TransformDescriptor;
    use serial_test::serial;
    use wiremock::matchers::{body_bytes, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> ProcessorClientConfig {
        ProcessorClientConfig {
            base_url: server.uri(),
            timeout: Duration::from_secs(5),
            names: vec!["resize".to_string()],
        }
    }

    fn options() -> ProcessOptions {
        ProcessOptions::new(
            TransformDescriptor::parse("q_85,w_800").unwrap(),
            "image/jpeg",
            "photo.jpg",
        )
    }

    #[test]
    fn test_config_defaults() {
        let config = ProcessorClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8001");
        assert_eq!(config.names.len(), DEFAULT_PROCESSOR_NAMES.len());
    }

    #[test]
    #[serial]
    fn test_config_from_env_names() {
        std::env::set_var("PROCESSOR_NAMES", "resize, webp,,");
        std::env::set_var("PROCESSOR_SERVICE_URL", "http://proc:9000/");
        let config = ProcessorClientConfig::from_env();
        assert_eq!(config.names, vec!["resize", "webp"]);
        assert_eq!(config.base_url, "http://proc:9000");
        std::env::remove_var("PROCESSOR_NAMES");
        std::env::remove_var("PROCESSOR_SERVICE_URL");
    }

    #[tokio::test]
    async fn test_process_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/process/resize"))
            .and(query_param("transform", "w_800,q_85"))
            .and(header("content-type", "image/jpeg"))
            .and(body_bytes(b"source".to_vec()))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-output-width", "800")
                    .insert_header("x-output-height", "600")
                    .set_body_raw(b"rendered".to_vec(), "image/jpeg"),
            )
            .mount(&server)
            .await;

        let registry = http_registry(&config(&server)).unwrap();
        let processor = registry.get("resize").unwrap();
        let output = processor
            .process(&options(), Bytes::from_static(b"source"))
            .await
            .unwrap();

        assert_eq!(output.data, Bytes::from_static(b"rendered"));
        assert_eq!(output.content_type, "image/jpeg");
        assert_eq!(output.width(), Some(800));
        assert_eq!(output.height(), Some(600));
    }

    #[tokio::test]
    async fn test_process_status_classification() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/process/resize"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/process/document"))
            .respond_with(ResponseTemplate::new(415).set_body_string("not a pdf"))
            .mount(&server)
            .await;

        let cfg = config(&server);
        let http = Client::new();

        let err = HttpProcessor::new("resize", &cfg, http.clone())
            .process(&options(), Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(err.is_unavailable());

        let err = HttpProcessor::new("document", &cfg, http)
            .process(&options(), Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::Rejected(msg) if msg.contains("not a pdf")));
    }

    #[tokio::test]
    async fn test_response_without_content_type_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let err = HttpProcessor::new("resize", &config(&server), Client::new())
            .process(&options(), Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::InvalidResponse(_)));
    }
}
