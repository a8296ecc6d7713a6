// # Value Source Trait
//
// Defines the interface for reading the current balance of a location.
//
// ## Implementations
//
// - HTTP page scraping: `balmon-source-http` crate
// - Future: headless browser rendering, vendor APIs
//
// ## Usage
//
// ```rust,ignore
// use balmon_core::ValueSource;
//
// let value = source.observe(&location).await?;
// println!("{}: {} RON", location.name, value);
// ```

use async_trait::async_trait;

use crate::config::{LocationConfig, SourceConfig};

/// Trait for value source implementations
///
/// A value source is an **observer**: it reads one number for one location
/// and reports it. It never touches state or decides whether anything
/// changed.
///
/// # Latency
///
/// `observe` must always resolve, either with a value or an error, within a
/// bounded time. The scheduler loop blocks on it, so a source that hangs
/// stalls command handling. Callers additionally wrap each call in a
/// timeout.
///
/// # Responsibilities
///
/// - ✅ Perform network I/O against the location's page
/// - ✅ Enforce its own request timeout
/// - ❌ Retry (the next automatic pass is the retry)
/// - ❌ Access the state store
/// - ❌ Spawn background tasks
#[async_trait]
pub trait ValueSource: Send + Sync {
    /// Read the current balance of a location
    ///
    /// # Returns
    ///
    /// - `Ok(u64)`: The observed balance
    /// - `Err(Error)`: The balance could not be determined this time
    async fn observe(&self, location: &LocationConfig) -> Result<u64, crate::Error>;

    /// Get the source name (for logging)
    fn source_name(&self) -> &'static str;
}

/// Helper trait for constructing value sources from configuration
pub trait ValueSourceFactory: Send + Sync {
    /// Create a ValueSource instance from configuration
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn ValueSource>, crate::Error>;
}
