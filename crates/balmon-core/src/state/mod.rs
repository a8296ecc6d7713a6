// # State Store Implementations
//
// This module provides implementations of the StateStore trait for
// different persistence strategies.

pub mod file;
pub mod memory;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;

use crate::config::StateStoreConfig;
use crate::traits::StateStore;

/// Open the state store described by `config`
pub async fn open(config: &StateStoreConfig) -> Result<Box<dyn StateStore>, crate::Error> {
    config.validate()?;

    match config {
        StateStoreConfig::File { path } => {
            tracing::debug!("Using file state store at {}", path);
            Ok(Box::new(FileStateStore::new(path).await?))
        }
        StateStoreConfig::Memory => {
            tracing::debug!("Using in-memory state store");
            Ok(Box::new(MemoryStateStore::new()))
        }
    }
}
