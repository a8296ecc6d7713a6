// # File State Store
//
// File-based implementation of StateStore with crash recovery.
//
// ## Purpose
//
// Keeps the last confirmed balance per location across restarts so the
// first pass after a restart does not re-announce every balance.
//
// ## Crash Recovery
//
// - Atomic writes: write temp file, sync, rename over the state file
// - Automatic backup: the previous state file is copied to `.backup`
// - Corruption: falls back to the backup, then to an empty map
//
// ## File Format
//
// ```json
// {
//   "Iași Palas Mall": {
//     "value": 150,
//     "observedAt": "2025-01-09T12:00:00Z"
//   }
// }
// ```
//
// Two older layouts are upgraded on load:
//
// ```json
// { "balance": 150, "location": "Iași Palas Mall", "timestamp": "2025-01-09T12:00:00.000Z" }
// { "Iași Palas Mall": 150, "Iași Piața Gării": 0 }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::Error;
use crate::traits::state_store::{BalanceMap, LocationBalance, StateStore};

/// File-based state store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use balmon_core::state::FileStateStore;
/// use balmon_core::traits::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStateStore::new("/var/lib/balmon/last_balance.json").await?;
///
///     let balances = store.load().await?;
///     store.save(&balances).await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
}

/// Why a state file could not be used
#[derive(Debug)]
enum LoadFailure {
    /// The file exists but its contents are not a known layout
    Corrupt(String),
    /// The file could not be read at all
    Unreadable(Error),
}

impl FileStateStore {
    /// Create a file state store, creating parent directories if needed
    ///
    /// Nothing is read here; the state is read by [`StateStore::load`].
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create state directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        Ok(Self { path })
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and decode one state file
    async fn read_file(path: &Path) -> Result<BalanceMap, LoadFailure> {
        let bytes = fs::read(path).await.map_err(|e| {
            LoadFailure::Unreadable(Error::state_store(format!(
                "Failed to read state file {}: {}",
                path.display(),
                e
            )))
        })?;

        // Bad encoding is corruption, not an I/O failure
        let content = String::from_utf8(bytes)
            .map_err(|e| LoadFailure::Corrupt(format!("not valid UTF-8: {}", e)))?;

        decode(&content).map_err(LoadFailure::Corrupt)
    }

    /// Write state to file atomically
    async fn write_state(&self, balances: &BalanceMap) -> Result<(), Error> {
        let json = encode(balances)?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.sync_all().await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        // Keep the last good state around for corruption recovery
        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("State written to file: {}", self.path.display());
        Ok(())
    }

    /// Recover from the backup file after the main file turned out corrupt
    async fn recover_from_backup(&self) -> BalanceMap {
        let backup_path = Self::backup_path(&self.path);
        if !backup_path.exists() {
            tracing::warn!("No backup file found. Starting with empty state.");
            return BalanceMap::new();
        }

        match Self::read_file(&backup_path).await {
            Ok(balances) => {
                tracing::info!("Recovered state from backup: {} locations", balances.len());
                balances
            }
            Err(LoadFailure::Corrupt(reason)) => {
                tracing::error!(
                    "Backup also corrupted: {}. Starting with empty state.",
                    reason
                );
                BalanceMap::new()
            }
            Err(LoadFailure::Unreadable(e)) => {
                tracing::error!("Backup unreadable: {}. Starting with empty state.", e);
                BalanceMap::new()
            }
        }
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    /// Get path to backup file
    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> Result<BalanceMap, Error> {
        if !self.path.exists() {
            tracing::debug!("State file does not exist: {}", self.path.display());
            return Ok(BalanceMap::new());
        }

        match Self::read_file(&self.path).await {
            Ok(balances) => {
                tracing::debug!("Loaded state from file: {} locations", balances.len());
                Ok(balances)
            }
            Err(LoadFailure::Corrupt(reason)) => {
                tracing::warn!(
                    "State file {} appears corrupted: {}. Attempting recovery from backup.",
                    self.path.display(),
                    reason
                );
                Ok(self.recover_from_backup().await)
            }
            Err(LoadFailure::Unreadable(e)) => Err(e),
        }
    }

    async fn save(&self, balances: &BalanceMap) -> Result<(), Error> {
        self.write_state(balances).await
    }
}

/// Serialize balances in the current layout
fn encode(balances: &BalanceMap) -> Result<String, Error> {
    let mut json = serde_json::to_string_pretty(balances)
        .map_err(|e| Error::state_store(format!("Failed to serialize state: {}", e)))?;
    json.push('\n');
    Ok(json)
}

/// Decode any known state layout into a balance map
fn decode(content: &str) -> Result<BalanceMap, String> {
    let root: Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
    let object = root
        .as_object()
        .ok_or_else(|| "top-level value is not an object".to_string())?;

    if is_single_location_layout(object) {
        tracing::info!("Upgrading single-location state file to per-location layout");
        return decode_single_location(object);
    }

    decode_entries(object.iter())
}

/// `{ "balance": n, "location": "...", "timestamp": ... }`
fn is_single_location_layout(object: &Map<String, Value>) -> bool {
    object.get("balance").is_some_and(Value::is_number)
        && object.get("location").is_some_and(Value::is_string)
}

fn decode_single_location(object: &Map<String, Value>) -> Result<BalanceMap, String> {
    let value = object
        .get("balance")
        .and_then(Value::as_u64)
        .ok_or_else(|| "legacy balance is not a non-negative integer".to_string())?;
    let location = object
        .get("location")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let observed_at = match object.get("timestamp") {
        Some(Value::String(ts)) => Some(
            ts.parse::<DateTime<Utc>>()
                .map_err(|e| format!("legacy timestamp {:?}: {}", ts, e))?,
        ),
        _ => None,
    };

    let mut balances = decode_entries(
        object
            .iter()
            .filter(|(key, _)| !matches!(key.as_str(), "balance" | "location" | "timestamp")),
    )?;
    balances.insert(location, LocationBalance { value, observed_at });
    Ok(balances)
}

/// Entries are either `{ "value": n, "observedAt": ... }` or a bare number
fn decode_entries<'a>(
    entries: impl Iterator<Item = (&'a String, &'a Value)>,
) -> Result<BalanceMap, String> {
    let mut balances = BalanceMap::new();
    for (location, entry) in entries {
        let balance = match entry {
            Value::Number(number) => number
                .as_u64()
                .map(LocationBalance::untimed)
                .ok_or_else(|| format!("{}: balance {} is not a non-negative integer", location, number))?,
            Value::Object(_) => serde_json::from_value::<LocationBalance>(entry.clone())
                .map_err(|e| format!("{}: {}", location, e))?,
            other => return Err(format!("{}: unexpected entry {}", location, other)),
        };
        balances.insert(location.clone(), balance);
    }
    Ok(balances)
}
