//! Test doubles and common utilities for contract tests
//!
//! Every double keeps its state behind an `Arc`, so a test can box one
//! handle into the monitor and keep a clone to script and inspect it.

#![allow(dead_code)]

use balmon_core::config::{LocationConfig, MonitorConfig, ScheduleConfig, SourceConfig};
use balmon_core::error::{Error, Result};
use balmon_core::traits::{
    Audience, BalanceMap, CommandTransport, InboundMessage, Notifier, StateStore, ValueSource,
};
use balmon_core::{MemoryStateStore, MonitorContext};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const PALAS: &str = "Iași Palas Mall";
pub const GARII: &str = "Iași Piața Gării";

/// A value source whose readings are set by the test
#[derive(Clone, Default)]
pub struct ScriptedSource {
    readings: Arc<Mutex<HashMap<String, std::result::Result<u64, String>>>>,
    observe_count: Arc<AtomicUsize>,
    hang: Arc<AtomicBool>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `value` for `location` until told otherwise
    pub fn set(&self, location: &str, value: u64) {
        self.readings
            .lock()
            .unwrap()
            .insert(location.to_string(), Ok(value));
    }

    /// Fail observations of `location` until told otherwise
    pub fn fail(&self, location: &str, reason: &str) {
        self.readings
            .lock()
            .unwrap()
            .insert(location.to_string(), Err(reason.to_string()));
    }

    /// Never resolve any observation
    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    /// Number of observe() calls so far
    pub fn observe_count(&self) -> usize {
        self.observe_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ValueSource for ScriptedSource {
    async fn observe(&self, location: &LocationConfig) -> Result<u64> {
        self.observe_count.fetch_add(1, Ordering::SeqCst);

        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let reading = self.readings.lock().unwrap().get(&location.name).cloned();
        match reading {
            Some(Ok(value)) => Ok(value),
            Some(Err(reason)) => Err(Error::observation(reason)),
            None => Err(Error::observation(format!("no reading for {}", location.name))),
        }
    }

    fn source_name(&self) -> &'static str {
        "scripted"
    }
}

/// A notifier that records every message it is asked to send
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(Audience, String)>>>,
    attempts: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send fail (attempts are still counted, nothing is recorded)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Messages delivered so far
    pub fn sent(&self) -> Vec<(Audience, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Messages delivered to `audience`
    pub fn sent_to(&self, audience: Audience) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(a, _)| *a == audience)
            .map(|(_, text)| text)
            .collect()
    }

    /// Number of send() calls, delivered or not
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, audience: Audience, text: &str) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::transport("notifier down"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((audience, text.to_string()));
        Ok(())
    }

    fn channel_name(&self) -> &'static str {
        "recording"
    }
}

/// A transport that hands out queued batches, then empty polls
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    batches: Arc<Mutex<VecDeque<std::result::Result<Vec<InboundMessage>, String>>>>,
    polled_since: Arc<Mutex<Vec<Option<i64>>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a batch for the next poll
    pub fn push(&self, messages: Vec<InboundMessage>) {
        self.batches.lock().unwrap().push_back(Ok(messages));
    }

    /// Queue a poll failure
    pub fn push_error(&self, reason: &str) {
        self.batches
            .lock()
            .unwrap()
            .push_back(Err(reason.to_string()));
    }

    /// The `since` argument of every poll so far
    pub fn polled_since(&self) -> Vec<Option<i64>> {
        self.polled_since.lock().unwrap().clone()
    }

    pub fn poll_count(&self) -> usize {
        self.polled_since.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl CommandTransport for ScriptedTransport {
    async fn poll(&self, since: Option<i64>) -> Result<Vec<InboundMessage>> {
        self.polled_since.lock().unwrap().push(since);
        // Yield so run_until can observe shutdown between polls
        tokio::task::yield_now().await;

        match self.batches.lock().unwrap().pop_front() {
            Some(Ok(messages)) => Ok(messages),
            Some(Err(reason)) => Err(Error::transport(reason)),
            None => Ok(Vec::new()),
        }
    }
}

/// A memory store whose writes can be made to fail
#[derive(Clone, Default)]
pub struct FlakyStore {
    inner: MemoryStateStore,
    save_count: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balances(balances: BalanceMap) -> Self {
        Self {
            inner: MemoryStateStore::with_balances(balances),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of save() calls, successful or not
    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }

    /// What was last written successfully
    pub async fn persisted(&self) -> BalanceMap {
        self.inner.load().await.unwrap()
    }
}

#[async_trait::async_trait]
impl StateStore for FlakyStore {
    async fn load(&self) -> Result<BalanceMap> {
        self.inner.load().await
    }

    async fn save(&self, balances: &BalanceMap) -> Result<()> {
        self.save_count.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::state_store("disk full"));
        }
        self.inner.save(balances).await
    }
}

/// The two reference locations
pub fn locations() -> Vec<LocationConfig> {
    vec![
        LocationConfig::new(PALAS, "https://www.bitomat.com/ro/bitomaty/bancomat-bitcoin-iasi-palas-mall"),
        LocationConfig::new(GARII, "https://www.bitomat.com/ro/bitomaty/bitcoin-atm-lasi-piata-garii"),
    ]
}

/// Configuration with a long check interval and no backoff
pub fn test_config() -> MonitorConfig {
    MonitorConfig {
        source: SourceConfig::Manual,
        locations: locations(),
        schedule: ScheduleConfig {
            check_interval_secs: 3600,
            error_backoff_secs: 0,
            observe_timeout_secs: 1,
        },
        ..MonitorConfig::new()
    }
}

/// Build a context from doubles
pub async fn context(
    config: MonitorConfig,
    source: Option<&ScriptedSource>,
    notifier: &RecordingNotifier,
    store: &FlakyStore,
) -> MonitorContext {
    MonitorContext::new(
        config,
        source.map(|s| Box::new(s.clone()) as Box<dyn ValueSource>),
        Box::new(notifier.clone()),
        Box::new(store.clone()),
    )
    .await
    .expect("context construction succeeds")
}

/// A message from the personal chat
pub fn personal(cursor: i64, text: &str) -> InboundMessage {
    InboundMessage::new(cursor, Some(Audience::Primary), text)
}

/// A message from the group chat
pub fn group(cursor: i64, text: &str) -> InboundMessage {
    InboundMessage::new(cursor, Some(Audience::Secondary), text)
}

/// A message from a chat that is neither
pub fn stranger(cursor: i64, text: &str) -> InboundMessage {
    InboundMessage::new(cursor, None, text)
}
