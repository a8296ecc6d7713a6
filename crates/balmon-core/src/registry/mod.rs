//! Plugin-based value source registry
//!
//! The registry maps source type names to factories, so the daemon picks
//! the value source from configuration without an if-else chain over every
//! implementation it might link in.
//!
//! ## Registration
//!
//! Implementations register themselves during initialization:
//!
//! ```rust,ignore
//! // In balmon-source-http
//! pub fn register(registry: &mut SourceRegistry, currency: &str) {
//!     registry.register_source("http", Box::new(HttpSourceFactory::new(currency)));
//! }
//! ```
//!
//! `manual` is built in: it resolves to no source at all.

use std::collections::HashMap;

use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::traits::{ValueSource, ValueSourceFactory};

/// Registry of value source factories
#[derive(Default)]
pub struct SourceRegistry {
    sources: HashMap<String, Box<dyn ValueSourceFactory>>,
}

impl SourceRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a value source factory under `name`
    ///
    /// A later registration with the same name replaces the earlier one.
    pub fn register_source(&mut self, name: impl Into<String>, factory: Box<dyn ValueSourceFactory>) {
        let name = name.into();
        tracing::debug!("Registered value source: {}", name);
        self.sources.insert(name, factory);
    }

    /// Create the value source described by `config`
    ///
    /// # Returns
    ///
    /// - `Ok(None)`: manual mode, no source
    /// - `Ok(Some(source))`: source built by the registered factory
    /// - `Err(Error)`: unknown source type, invalid config, or factory failure
    pub fn create_source(&self, config: &SourceConfig) -> Result<Option<Box<dyn ValueSource>>> {
        config.validate()?;

        if matches!(config, SourceConfig::Manual) {
            return Ok(None);
        }

        let source_type = config.type_name();
        let factory = self
            .sources
            .get(source_type)
            .ok_or_else(|| Error::config(format!("Unknown value source type: {}", source_type)))?;

        factory.create(config).map(Some)
    }

    /// List all registered source types
    pub fn list_sources(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a source type is registered
    pub fn has_source(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.list_sources())
            .finish()
    }
}
