// # State Store Trait
//
// Defines the interface for persistent balance state.
//
// ## Purpose
//
// The state store keeps the last confirmed balance for each location so that
// change detection survives restarts:
// - The last observed value per location
// - When that value was observed
//
// ## Implementations
//
// - File-based: JSON file with atomic replace (`FileStateStore`)
// - In-memory: for tests and throwaway deployments (`MemoryStateStore`)
//
// ## Usage
//
// ```rust,ignore
// use balmon_core::StateStore;
//
// let mut balances = store.load().await?;
// balances.insert("Iași Palas Mall".into(), LocationBalance::observed(150, now));
// store.save(&balances).await?;
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Last confirmed balance for one location
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationBalance {
    /// Value of the most recent successful observation
    pub value: u64,
    /// When that observation happened; absent for upgraded legacy entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<DateTime<Utc>>,
}

impl LocationBalance {
    /// A balance confirmed by an observation at `at`
    pub fn observed(value: u64, at: DateTime<Utc>) -> Self {
        Self {
            value,
            observed_at: Some(at),
        }
    }

    /// A balance with no known observation time
    pub fn untimed(value: u64) -> Self {
        Self {
            value,
            observed_at: None,
        }
    }

    /// Time elapsed since the last observation, if known
    pub fn age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.observed_at.map(|at| now.signed_duration_since(at))
    }
}

/// Location name to last confirmed balance
///
/// Ordered so that serialization is deterministic.
pub type BalanceMap = BTreeMap<String, LocationBalance>;

/// Trait for state store implementations
///
/// Only the scheduler thread writes through this trait, so implementations
/// never see concurrent `save` calls. They must still leave the previous
/// snapshot readable while a new one is being written.
///
/// # Responsibilities
///
/// - ✅ Persist and restore the whole balance map
/// - ✅ Recover from corrupt or legacy state on `load`
/// - ❌ Decide whether a balance changed (owned by the engine)
/// - ❌ Send notifications
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the persisted balances
    ///
    /// # Returns
    ///
    /// - `Ok(map)`: Persisted balances, or an empty map when no state exists
    ///   yet or the stored state is unreadable
    /// - `Err(Error)`: Storage could not be accessed at all
    async fn load(&self) -> Result<BalanceMap, crate::Error>;

    /// Replace the persisted balances with `balances`
    ///
    /// The write must be atomic: a crash mid-save leaves either the old or
    /// the new snapshot, never a partial one.
    async fn save(&self, balances: &BalanceMap) -> Result<(), crate::Error>;
}
