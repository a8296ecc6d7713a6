// # balmond - Balance Monitor Daemon
//
// This daemon is a THIN integration layer:
// - DO NOT add change detection, formatting or retry logic here
// - All monitor logic lives in balmon-core
// - Configuration is via environment variables ONLY
//
// The balmond daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Registering value sources and opening the state store
// 4. Running the scheduler until SIGTERM/SIGINT
//
// ## Configuration
//
// ### Telegram
// - `TELEGRAM_BOT_TOKEN`: Bot token (required)
// - `TELEGRAM_CHAT_ID`: Personal chat ID (required)
// - `TELEGRAM_GROUP_ID`: Group chat ID for announcements (default: personal chat)
//
// ### Locations
// - `BALMON_LOCATIONS`: `Name=url;Name=url` (default: the two Iași ATMs)
// - `BALMON_CURRENCY`: Currency label (default: RON)
//
// ### Value Source
// - `BALMON_SOURCE_TYPE`: `http` or `manual` (default: http)
// - `BALMON_BALANCE_PATTERN`: Regex with one capture group (http only)
//
// ### Schedule & Notifications
// - `BALMON_CHECK_INTERVAL_SECS`: Automatic pass interval, 60..=86400 (default: 10800)
// - `BALMON_WITHDRAWAL_AUDIENCE`: `group`, `personal` or `off` (default: group)
//
// ### State Store
// - `BALMON_STATE_STORE_TYPE`: `file` or `memory` (default: file)
// - `BALMON_STATE_PATH`: State file (default: last_balance.json)
//
// ### Logging
// - `BALMON_LOG_LEVEL`: trace, debug, info, warn, error (default: info)
//
// ## Example
//
// ```bash
// export TELEGRAM_BOT_TOKEN=123456:ABC-DEF
// export TELEGRAM_CHAT_ID=12345678
// export TELEGRAM_GROUP_ID=-100987654321
// export BALMON_STATE_PATH=/var/lib/balmon/last_balance.json
//
// balmond
// ```

use anyhow::{Context, Result};
use balmon_core::traits::{Audience, ValueSource};
use balmon_core::{
    LocationConfig, MonitorConfig, MonitorContext, NotificationPolicy, Scheduler, ScheduleConfig,
    SourceConfig, SourceRegistry, StateStoreConfig, report,
};
use balmon_telegram::TelegramBot;
use std::env;
use std::process::ExitCode;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Locations monitored when `BALMON_LOCATIONS` is unset
const DEFAULT_LOCATIONS: &[(&str, &str)] = &[
    (
        "Iași Palas Mall",
        "https://www.bitomat.com/ro/bitomaty/bancomat-bitcoin-iasi-palas-mall",
    ),
    (
        "Iași Piața Gării",
        "https://www.bitomat.com/ro/bitomaty/bitcoin-atm-lasi-piata-garii",
    ),
];

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum BalmonExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<BalmonExitCode> for ExitCode {
    fn from(code: BalmonExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    bot_token: String,
    chat_id: i64,
    group_id: Option<i64>,
    locations: Vec<LocationConfig>,
    currency: String,
    source_type: String,
    balance_pattern: Option<String>,
    check_interval_secs: u64,
    withdrawal_audience: String,
    state_store_type: String,
    state_path: String,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bot_token = var("TELEGRAM_BOT_TOKEN").context(
            "TELEGRAM_BOT_TOKEN is required. \
            Set it via: export TELEGRAM_BOT_TOKEN=your_token",
        )?;

        let chat_id: i64 = var("TELEGRAM_CHAT_ID")
            .context("TELEGRAM_CHAT_ID is required")?
            .trim()
            .parse()
            .context("TELEGRAM_CHAT_ID must be a numeric chat ID")?;

        let group_id: Option<i64> = var("TELEGRAM_GROUP_ID")
            .map(|v| v.trim().parse())
            .transpose()
            .context("TELEGRAM_GROUP_ID must be a numeric chat ID")?;

        let locations = match var("BALMON_LOCATIONS") {
            Some(raw) => parse_locations(&raw)?,
            None => DEFAULT_LOCATIONS
                .iter()
                .map(|(name, url)| LocationConfig::new(*name, *url))
                .collect(),
        };

        let check_interval_secs: u64 = match var("BALMON_CHECK_INTERVAL_SECS") {
            Some(v) => v
                .trim()
                .parse()
                .context("BALMON_CHECK_INTERVAL_SECS must be a whole number of seconds")?,
            None => ScheduleConfig::default().check_interval_secs,
        };

        Ok(Self {
            bot_token,
            chat_id,
            group_id,
            locations,
            currency: var("BALMON_CURRENCY").unwrap_or_else(|| "RON".to_string()),
            source_type: var("BALMON_SOURCE_TYPE").unwrap_or_else(|| "http".to_string()),
            balance_pattern: var("BALMON_BALANCE_PATTERN"),
            check_interval_secs,
            withdrawal_audience: var("BALMON_WITHDRAWAL_AUDIENCE")
                .unwrap_or_else(|| "group".to_string()),
            state_store_type: var("BALMON_STATE_STORE_TYPE").unwrap_or_else(|| "file".to_string()),
            state_path: var("BALMON_STATE_PATH")
                .unwrap_or_else(|| "last_balance.json".to_string()),
            log_level: var("BALMON_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    ///
    /// Checks the values the monitor config cannot check by itself: the
    /// token shape, enumerations and numeric ranges. Everything else is
    /// left to `MonitorConfig::validate`.
    fn validate(&self) -> Result<()> {
        // Check for obvious placeholder tokens (common mistake)
        let token_lower = self.bot_token.to_lowercase();
        if token_lower.contains("your_token") || token_lower.contains("replace_me") {
            anyhow::bail!(
                "TELEGRAM_BOT_TOKEN appears to be a placeholder. \
                Use the token issued by @BotFather."
            );
        }

        match self.source_type.as_str() {
            "http" | "manual" => {}
            _ => anyhow::bail!(
                "BALMON_SOURCE_TYPE '{}' is not supported. \
                Supported types: http, manual",
                self.source_type
            ),
        }

        match self.state_store_type.as_str() {
            "file" | "memory" => {}
            _ => anyhow::bail!(
                "BALMON_STATE_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                self.state_store_type
            ),
        }

        if !(60..=86_400).contains(&self.check_interval_secs) {
            anyhow::bail!(
                "BALMON_CHECK_INTERVAL_SECS must be between 60 and 86400 seconds. Got: {}",
                self.check_interval_secs
            );
        }

        self.withdrawal_audience()?;

        for location in &self.locations {
            if !location.url.starts_with("https://") && !location.url.starts_with("http://") {
                anyhow::bail!(
                    "Location '{}' must use an HTTP or HTTPS URL. Got: {}",
                    location.name,
                    location.url
                );
            }
        }

        // Check parent directory exists
        if self.state_store_type == "file"
            && let Some(parent) = std::path::Path::new(&self.state_path).parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            anyhow::bail!(
                "BALMON_STATE_PATH parent directory does not exist: {}. \
                    Create it first: mkdir -p {}",
                parent.display(),
                parent.display()
            );
        }

        self.log_level()?;

        self.monitor_config().validate()?;

        Ok(())
    }

    fn withdrawal_audience(&self) -> Result<Option<Audience>> {
        match self.withdrawal_audience.trim().to_lowercase().as_str() {
            "off" | "none" => Ok(None),
            name => Audience::parse(name).map(Some).ok_or_else(|| {
                anyhow::anyhow!(
                    "BALMON_WITHDRAWAL_AUDIENCE '{}' is not valid. \
                    Valid values: group, personal, off",
                    self.withdrawal_audience
                )
            }),
        }
    }

    fn log_level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "BALMON_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }

    /// Build the monitor configuration
    fn monitor_config(&self) -> MonitorConfig {
        let source = match self.source_type.as_str() {
            "manual" => SourceConfig::Manual,
            _ => SourceConfig::Http {
                user_agent: None,
                request_timeout_secs: 30,
                balance_pattern: self.balance_pattern.clone(),
            },
        };

        let state_store = match self.state_store_type.as_str() {
            "memory" => StateStoreConfig::Memory,
            _ => StateStoreConfig::File {
                path: self.state_path.clone(),
            },
        };

        MonitorConfig {
            source,
            state_store,
            locations: self.locations.clone(),
            schedule: ScheduleConfig {
                check_interval_secs: self.check_interval_secs,
                ..ScheduleConfig::default()
            },
            notifications: NotificationPolicy::default()
                .with_decrease(self.withdrawal_audience().ok().flatten()),
            currency: self.currency.clone(),
        }
    }
}

/// Parse `Name=url;Name=url`
fn parse_locations(raw: &str) -> Result<Vec<LocationConfig>> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (name, url) = entry.split_once('=').ok_or_else(|| {
                anyhow::anyhow!(
                    "BALMON_LOCATIONS entry '{}' must look like Name=https://...",
                    entry
                )
            })?;
            Ok(LocationConfig::new(name.trim(), url.trim()))
        })
        .collect()
}

/// Build the value source before the runtime starts
fn create_source(config: &MonitorConfig) -> Result<Option<Box<dyn ValueSource>>> {
    #[allow(unused_mut)]
    let mut registry = SourceRegistry::new();

    #[cfg(feature = "http")]
    balmon_source_http::register(&mut registry, &config.currency);

    info!("Available value sources: {:?}", registry.list_sources());

    Ok(registry.create_source(&config.source)?)
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return BalmonExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return BalmonExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = config.log_level().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return BalmonExitCode::ConfigError.into();
    }

    info!("Starting balmond daemon");
    info!(
        "Configuration loaded: {} location(s), source {}, state store {}",
        config.locations.len(),
        config.source_type,
        config.state_store_type
    );

    let monitor_config = config.monitor_config();

    let source = match create_source(&monitor_config) {
        Ok(source) => source,
        Err(e) => {
            error!("Failed to create value source: {:#}", e);
            return BalmonExitCode::ConfigError.into();
        }
    };

    let bot = match TelegramBot::new(&config.bot_token, config.chat_id, config.group_id) {
        Ok(bot) => bot,
        Err(e) => {
            error!("Failed to create Telegram bot: {}", e);
            return BalmonExitCode::ConfigError.into();
        }
    };

    // One logical thread of control: passes and commands never overlap
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return BalmonExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(monitor_config, source, bot).await {
            error!("Daemon error: {:#}", e);
            BalmonExitCode::RuntimeError
        } else {
            BalmonExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(
    config: MonitorConfig,
    source: Option<Box<dyn ValueSource>>,
    bot: TelegramBot,
) -> Result<()> {
    let store = balmon_core::state::open(&config.state_store)
        .await
        .context("Failed to open state store")?;

    let ctx = MonitorContext::new(config, source, Box::new(bot.clone()), store)
        .await
        .context("Failed to initialize monitor")?;

    let automatic = ctx.is_automatic();
    info!(
        "Monitoring {} location(s) in {} mode, {} known balance(s)",
        ctx.config().locations.len(),
        if automatic { "automatic" } else { "manual" },
        ctx.balances().len()
    );

    match bot.delete_webhook().await {
        Ok(true) => info!("Webhook deleted, polling for commands"),
        Ok(false) => warn!("No webhook deleted, polling anyway"),
        Err(e) => warn!("Failed to delete webhook: {}", e),
    }

    ctx.send_best_effort(Audience::Primary, &report::startup_banner(automatic))
        .await;

    let shutdown = shutdown_signal()?;
    let mut scheduler = Scheduler::new(ctx, Box::new(bot));

    scheduler
        .run_until(async move {
            let signal = shutdown.await;
            info!("Received shutdown signal: {}", signal);
        })
        .await?;

    if scheduler.context().has_unsaved_changes() {
        warn!("Shutting down with balances that could not be saved");
    }
    info!("Shutting down daemon");

    Ok(())
}

/// Install handlers for SIGTERM and SIGINT
///
/// The handlers are installed before this returns; the returned future
/// resolves with the name of the first signal received.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        }
    })
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to wait for CTRL-C: {}", e);
        }
        "SIGINT"
    })
}
