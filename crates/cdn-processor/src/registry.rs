//! Name-keyed processor registry.

use std::collections::HashMap;
use std::sync::Arc;

use crate::processor::Processor;

/// Maps processor names to implementations. Registration is additive; a
/// later registration under the same name replaces the earlier one.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the processor's own name.
    pub fn register(&mut self, processor: Arc<dyn Processor>) -> &mut Self {
        self.processors.insert(processor.name().to_string(), processor);
        self
    }

    pub fn with(mut self, processor: Arc<dyn Processor>) -> Self {
        self.register(processor);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Processor>> {
        self.processors.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.processors.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.processors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessorResult;
    use crate::processor::{ProcessOptions, ProcessedOutput};
    use async_trait::async_trait;
    use bytes::Bytes;

    struct Echo(&'static str);

    #[async_trait]
    impl Processor for Echo {
        fn name(&self) -> &str {
            self.0
        }

        async fn process(&self, options: &ProcessOptions, input: Bytes) -> ProcessorResult<ProcessedOutput> {
            Ok(ProcessedOutput::new(input, options.source_content_type.clone()))
        }
    }

    #[test]
    fn test_register_and_get() {
        let registry = ProcessorRegistry::new()
            .with(Arc::new(Echo("resize")))
            .with(Arc::new(Echo("thumbnail")));

        assert_eq!(registry.names(), vec!["resize", "thumbnail"]);
        assert!(registry.get("resize").is_some());
        assert!(registry.get("watermark").is_none());
    }

    #[test]
    fn test_reregister_replaces() {
        let mut registry = ProcessorRegistry::new();
        registry.register(Arc::new(Echo("resize")));
        registry.register(Arc::new(Echo("resize")));
        assert_eq!(registry.len(), 1);
    }
}
