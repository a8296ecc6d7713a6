//! Configuration types for the balance monitor
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::engine::NotificationPolicy;

/// Main monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Value source configuration
    pub source: SourceConfig,

    /// State store configuration
    pub state_store: StateStoreConfig,

    /// Locations to monitor, in reporting order
    pub locations: Vec<LocationConfig>,

    /// Timer and timeout settings
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Who gets told about which kind of change
    #[serde(default)]
    pub notifications: NotificationPolicy,

    /// Currency label used in messages and balance extraction
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl MonitorConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            source: SourceConfig::default(),
            state_store: StateStoreConfig::default(),
            locations: Vec::new(),
            schedule: ScheduleConfig::default(),
            notifications: NotificationPolicy::default(),
            currency: default_currency(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.locations.is_empty() {
            return Err(crate::Error::config("No locations configured"));
        }

        let mut seen = std::collections::HashSet::new();
        for location in &self.locations {
            location.validate()?;
            if !seen.insert(location.name.to_lowercase()) {
                return Err(crate::Error::config(format!(
                    "Duplicate location name: {}",
                    location.name
                )));
            }
        }

        if self.currency.trim().is_empty() {
            return Err(crate::Error::config("Currency cannot be empty"));
        }

        self.source.validate()?;
        self.state_store.validate()?;

        Ok(())
    }

    /// Locations that take part in observation passes
    pub fn enabled_locations(&self) -> impl Iterator<Item = &LocationConfig> {
        self.locations.iter().filter(|l| l.enabled)
    }

    /// Find a configured location by name, ignoring case
    pub fn find_location(&self, name: &str) -> Option<&LocationConfig> {
        let wanted = name.trim().to_lowercase();
        self.locations
            .iter()
            .find(|l| l.name.to_lowercase() == wanted)
    }

    /// The location a bare `/balance <amount>` applies to
    pub fn default_location(&self) -> Option<&LocationConfig> {
        self.locations.first()
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Value source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Fetch each location's page over HTTP and extract the balance
    Http {
        /// User-Agent header to send (browser-like default when absent)
        #[serde(default)]
        user_agent: Option<String>,
        /// Per-request timeout in seconds
        #[serde(default = "default_request_timeout_secs")]
        request_timeout_secs: u64,
        /// Regex with one capture group for the amount; overrides the
        /// built-in primary pattern
        #[serde(default)]
        balance_pattern: Option<String>,
    },

    /// No automatic source: the bot sends reminders and accepts `/balance`
    Manual,

    /// Custom value source
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl SourceConfig {
    /// Validate the source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            SourceConfig::Http {
                request_timeout_secs,
                ..
            } => {
                if *request_timeout_secs == 0 {
                    return Err(crate::Error::config(
                        "HTTP source request timeout must be > 0",
                    ));
                }
                Ok(())
            }
            SourceConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom source factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(crate::Error::config("Custom source config cannot be null"));
                }
                Ok(())
            }
            SourceConfig::Manual => Ok(()),
        }
    }

    /// Get the source type name used for registry lookup
    pub fn type_name(&self) -> &str {
        match self {
            SourceConfig::Http { .. } => "http",
            SourceConfig::Manual => "manual",
            SourceConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Http {
            user_agent: None,
            request_timeout_secs: default_request_timeout_secs(),
            balance_pattern: None,
        }
    }
}

/// State store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateStoreConfig {
    /// File-based state store
    File {
        /// Path to the state file
        path: String,
    },

    /// In-memory state store (not persistent)
    #[default]
    Memory,
}

impl StateStoreConfig {
    /// Validate the state store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StateStoreConfig::File { path } if path.trim().is_empty() => {
                Err(crate::Error::config("State file path cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

/// A monitored location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationConfig {
    /// Stable display name, also the state key (e.g. "Iași Palas Mall")
    pub name: String,

    /// Page the value source reads
    pub url: String,

    /// Whether this location takes part in observation passes
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl LocationConfig {
    /// Create a new location configuration
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            enabled: true,
        }
    }

    /// Enable or disable the location
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    fn validate(&self) -> Result<(), crate::Error> {
        if self.name.trim().is_empty() {
            return Err(crate::Error::config("Location name cannot be empty"));
        }
        if self.url.trim().is_empty() {
            return Err(crate::Error::config(format!(
                "Location {} has an empty URL",
                self.name
            )));
        }
        Ok(())
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Time between automatic passes (in seconds)
    ///
    /// 0 runs an automatic pass on every tick.
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    /// Pause after a failed tick (in seconds)
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,

    /// Upper bound for a single observation (in seconds)
    #[serde(default = "default_observe_timeout_secs")]
    pub observe_timeout_secs: u64,
}

impl ScheduleConfig {
    /// Interval between automatic passes
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// Pause after a failed tick
    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    /// Upper bound for a single observation
    pub fn observe_timeout(&self) -> Duration {
        Duration::from_secs(self.observe_timeout_secs)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval_secs(),
            error_backoff_secs: default_error_backoff_secs(),
            observe_timeout_secs: default_observe_timeout_secs(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_currency() -> String {
    "RON".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_check_interval_secs() -> u64 {
    3 * 60 * 60
}

fn default_error_backoff_secs() -> u64 {
    5
}

fn default_observe_timeout_secs() -> u64 {
    90
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_locations() {
        let config = MonitorConfig::new();
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let mut config = MonitorConfig::new();
        config.locations = vec![
            LocationConfig::new("Iași Palas Mall", "https://a.example"),
            LocationConfig::new("iași palas mall", "https://b.example"),
        ];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
    }

    #[test]
    fn test_find_location_ignores_case() {
        let mut config = MonitorConfig::new();
        config.locations = vec![
            LocationConfig::new("Iași Palas Mall", "https://a.example"),
            LocationConfig::new("Iași Piața Gării", "https://b.example"),
        ];
        assert_eq!(
            config.find_location("iași piața gării").map(|l| l.url.as_str()),
            Some("https://b.example")
        );
        assert_eq!(
            config.default_location().map(|l| l.name.as_str()),
            Some("Iași Palas Mall")
        );
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let json = serde_json::json!({
            "source": { "type": "manual" },
            "state_store": { "type": "file", "path": "last_balance.json" },
            "locations": [ { "name": "Iași Palas Mall", "url": "https://a.example" } ]
        });
        let config: MonitorConfig = serde_json::from_value(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.schedule.check_interval(), Duration::from_secs(10800));
        assert_eq!(config.currency, "RON");
        assert!(config.locations[0].enabled);
        assert_eq!(config.source.type_name(), "manual");
    }
}
