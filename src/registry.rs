use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::EraError;
use crate::fetch::SourceFetcher;
use crate::parser::{HtmlParser, Parser, ZipParser};
use crate::store::ResultsStore;

/// Parsers keyed by the method name they report.
#[derive(Default)]
pub struct ParserRegistry {
    parsers: HashMap<String, Box<dyn Parser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the `zip` and `html` parsers sharing one fetcher and store.
    pub fn with_defaults<F, S>(fetcher: F, store: Arc<S>) -> Result<Self, EraError>
    where
        F: SourceFetcher + Clone + 'static,
        S: ResultsStore + 'static,
    {
        let mut registry = Self::new();
        registry.register(Box::new(ZipParser::new(fetcher.clone(), store.clone())?));
        registry.register(Box::new(HtmlParser::new(fetcher, store)?));
        Ok(registry)
    }

    /// Replaces any parser already registered under the same method.
    pub fn register(&mut self, parser: Box<dyn Parser>) {
        let method = parser.method().to_string();
        debug!(method = %method, "registering parser");
        self.parsers.insert(method, parser);
    }

    pub fn resolve(&mut self, method: &str) -> Result<&mut dyn Parser, EraError> {
        match self.parsers.get_mut(method) {
            Some(parser) => Ok(parser.as_mut()),
            None => Err(EraError::NotFound(format!(
                "no parser found for method: {method}"
            ))),
        }
    }

    pub fn methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.parsers.keys().cloned().collect();
        methods.sort();
        methods
    }

    /// Releases every parser's resources, logging failures.
    pub fn cleanup(&mut self) {
        for (method, parser) in self.parsers.iter_mut() {
            if let Err(err) = parser.cleanup() {
                warn!(method = %method, error = %err, "error cleaning up parser");
            }
        }
    }
}
