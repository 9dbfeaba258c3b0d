//! Named media processors.
//!
//! The gateway never transforms bytes itself. It picks a processor name from
//! the transform descriptor and looks it up in a [`ProcessorRegistry`]. In
//! production every name maps to an [`HttpProcessor`] route on the external
//! processing service.

pub mod client;
pub mod error;
pub mod processor;
pub mod registry;

pub use client::{http_registry, HttpProcessor, ProcessorClientConfig, DEFAULT_PROCESSOR_NAMES};
pub use error::{ProcessorError, ProcessorResult};
pub use processor::{metadata_keys, ProcessOptions, ProcessedOutput, Processor};
pub use registry::ProcessorRegistry;
