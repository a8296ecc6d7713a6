// # Memory State Store
//
// In-memory implementation of StateStore.
//
// ## Purpose
//
// Provides a simple state store that doesn't persist across restarts.
// Useful for testing and for deployments where re-announcing every
// balance after a restart is acceptable.
//
// ## Crash Behavior
//
// - All state is lost on restart/crash
// - The first pass after a restart reports every positive balance as new

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::state_store::{BalanceMap, StateStore};

/// In-memory state store implementation
///
/// Clones share the same underlying map, so a test can keep a handle and
/// inspect what the monitor committed.
///
/// # Example
///
/// ```rust,no_run
/// use balmon_core::state::MemoryStateStore;
/// use balmon_core::traits::{BalanceMap, LocationBalance, StateStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStateStore::new();
///
///     let mut balances = BalanceMap::new();
///     balances.insert("Iași Palas Mall".to_string(), LocationBalance::untimed(150));
///     store.save(&balances).await?;
///
///     assert_eq!(store.load().await?, balances);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<BalanceMap>>,
}

impl MemoryStateStore {
    /// Create a new empty memory state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that starts out holding `balances`
    pub fn with_balances(balances: BalanceMap) -> Self {
        Self {
            inner: Arc::new(RwLock::new(balances)),
        }
    }

    /// Get the number of locations in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<BalanceMap, Error> {
        Ok(self.inner.read().await.clone())
    }

    async fn save(&self, balances: &BalanceMap) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        *guard = balances.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::LocationBalance;

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryStateStore::new();
        assert!(store.is_empty().await);

        let mut balances = BalanceMap::new();
        balances.insert("A".to_string(), LocationBalance::untimed(10));
        balances.insert("B".to_string(), LocationBalance::untimed(0));
        store.save(&balances).await.unwrap();

        assert_eq!(store.len().await, 2);
        assert_eq!(store.load().await.unwrap(), balances);
    }

    #[tokio::test]
    async fn test_memory_store_save_replaces_snapshot() {
        let mut initial = BalanceMap::new();
        initial.insert("A".to_string(), LocationBalance::untimed(10));
        let store = MemoryStateStore::with_balances(initial);

        let mut next = BalanceMap::new();
        next.insert("B".to_string(), LocationBalance::untimed(3));
        store.save(&next).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert!(!loaded.contains_key("A"));
        assert_eq!(loaded["B"].value, 3);
    }

    #[tokio::test]
    async fn test_memory_store_clones_share_state() {
        let store = MemoryStateStore::new();
        let handle = store.clone();

        let mut balances = BalanceMap::new();
        balances.insert("A".to_string(), LocationBalance::untimed(1));
        store.save(&balances).await.unwrap();

        assert_eq!(handle.len().await, 1);
    }
}
