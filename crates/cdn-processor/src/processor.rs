//! The processor contract.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;

use cdn_models::TransformDescriptor;

use crate::error::ProcessorResult;

/// Metadata keys processors may report.
pub mod metadata_keys {
    pub const WIDTH: &str = "width";
    pub const HEIGHT: &str = "height";
}

/// What to do with the input bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOptions {
    pub descriptor: TransformDescriptor,
    /// MIME type of the source bytes.
    pub source_content_type: String,
    /// Caller-facing filename, for processors that derive an output name.
    pub filename: String,
}

impl ProcessOptions {
    pub fn new(
        descriptor: TransformDescriptor,
        source_content_type: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            descriptor,
            source_content_type: source_content_type.into(),
            filename: filename.into(),
        }
    }
}

/// A produced rendition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedOutput {
    pub data: Bytes,
    pub content_type: String,
    /// Suggested output filename, if the processor changed the extension.
    pub filename: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl ProcessedOutput {
    pub fn new(data: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            content_type: content_type.into(),
            filename: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn width(&self) -> Option<u32> {
        self.metadata_u32(metadata_keys::WIDTH)
    }

    pub fn height(&self) -> Option<u32> {
        self.metadata_u32(metadata_keys::HEIGHT)
    }

    fn metadata_u32(&self, key: &str) -> Option<u32> {
        self.metadata.get(key).and_then(|v| v.parse().ok())
    }
}

/// A named transformation engine.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Registry name, e.g. `resize`.
    fn name(&self) -> &str;

    async fn process(&self, options: &ProcessOptions, input: Bytes) -> ProcessorResult<ProcessedOutput>;
}
