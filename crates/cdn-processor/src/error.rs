//! Processor error types.

use thiserror::Error;

pub type ProcessorResult<T> = Result<T, ProcessorError>;

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Processor rejected input: {0}")]
    Rejected(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl ProcessorError {
    /// Upstream outages, as opposed to the processor refusing this input.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            ProcessorError::ServiceUnavailable(_)
                | ProcessorError::Timeout(_)
                | ProcessorError::Network(_)
        )
    }
}
