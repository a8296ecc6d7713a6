//! Monitor context
//!
//! [`MonitorContext`] owns everything a pass or a command needs: the
//! configuration, the collaborators, and the in-memory copy of the
//! persisted balances. It is built once at startup and handed to the
//! [`Scheduler`](crate::scheduler::Scheduler) by value; the
//! [`CommandDispatcher`](crate::dispatch::CommandDispatcher) borrows it
//! mutably per message. Only one of them touches it at a time, which is what
//! keeps state writes strictly serialized.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::{LocationConfig, MonitorConfig};
use crate::engine::{self, Observation, Outcome, Reconciliation};
use crate::error::Result;
use crate::report;
use crate::traits::{Audience, BalanceMap, Notifier, StateStore, ValueSource};

/// Shared state and collaborators of a running monitor
pub struct MonitorContext {
    config: MonitorConfig,
    source: Option<Box<dyn ValueSource>>,
    notifier: Box<dyn Notifier>,
    store: Box<dyn StateStore>,
    balances: BalanceMap,
    unsaved: bool,
}

impl MonitorContext {
    /// Build the context and load the persisted balances
    ///
    /// `source == None` puts the monitor in manual mode: no observations,
    /// reminders instead of automatic passes.
    pub async fn new(
        config: MonitorConfig,
        source: Option<Box<dyn ValueSource>>,
        notifier: Box<dyn Notifier>,
        store: Box<dyn StateStore>,
    ) -> Result<Self> {
        config.validate()?;

        let balances = store.load().await?;
        info!(
            "Loaded {} stored balance(s); {} location(s) configured",
            balances.len(),
            config.locations.len()
        );

        Ok(Self {
            config,
            source,
            notifier,
            store,
            balances,
            unsaved: false,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Last confirmed balances, including writes that failed to persist
    pub fn balances(&self) -> &BalanceMap {
        &self.balances
    }

    /// Whether a value source is configured
    pub fn is_automatic(&self) -> bool {
        self.source.is_some()
    }

    /// Whether the last commit failed to reach the store
    pub fn has_unsaved_changes(&self) -> bool {
        self.unsaved
    }

    /// Observe one location, bounded by the configured observation timeout
    ///
    /// Never fails: errors, timeouts and manual mode all become a failed
    /// reading.
    pub async fn observe(&self, location: &LocationConfig) -> Observation {
        let Some(source) = &self.source else {
            return Observation::failed(&location.name, "no value source configured");
        };

        let timeout = self.config.schedule.observe_timeout();
        match tokio::time::timeout(timeout, source.observe(location)).await {
            Ok(Ok(value)) => {
                debug!("{}: {} {}", location.name, value, self.config.currency);
                Observation::value(&location.name, value)
            }
            Ok(Err(e)) => {
                warn!("Failed to observe {}: {}", location.name, e);
                Observation::failed(&location.name, e.to_string())
            }
            Err(_) => {
                warn!(
                    "Observation of {} timed out after {:?}",
                    location.name, timeout
                );
                Observation::failed(&location.name, format!("timed out after {:?}", timeout))
            }
        }
    }

    /// Observe every enabled location, one after the other
    pub async fn observe_all(&self) -> Vec<Observation> {
        let mut observations = Vec::with_capacity(self.config.locations.len());
        for location in self.config.enabled_locations() {
            observations.push(self.observe(location).await);
        }
        observations
    }

    /// Replace the in-memory balances and persist them
    ///
    /// On a store failure the new balances are kept in memory and the error
    /// is returned; the next commit writes again even if nothing changed.
    pub async fn commit(&mut self, state: BalanceMap) -> Result<()> {
        if state == self.balances && !self.unsaved {
            debug!("State unchanged, skipping write");
            return Ok(());
        }

        self.balances = state;
        match self.store.save(&self.balances).await {
            Ok(()) => {
                if self.unsaved {
                    info!("Previously unsaved state written");
                }
                self.unsaved = false;
                Ok(())
            }
            Err(e) => {
                error!("Failed to persist state: {}", e);
                self.unsaved = true;
                Err(e)
            }
        }
    }

    /// Reconcile `observations` and commit the result, without announcing
    ///
    /// The outcomes are returned together with the commit result: on a
    /// store failure the in-memory balances have still moved on.
    pub async fn record(
        &mut self,
        observations: &[Observation],
        now: DateTime<Utc>,
    ) -> (Vec<Outcome>, Result<()>) {
        let Reconciliation { outcomes, state } = engine::reconcile(observations, &self.balances, now);

        for outcome in outcomes.iter().filter(|o| o.is_change()) {
            info!(
                "{}: {} -> {} {} ({:?})",
                outcome.location,
                outcome.previous_value.unwrap_or(0),
                outcome.new_value,
                self.config.currency,
                outcome.classification
            );
        }

        let committed = self.commit(state).await;
        (outcomes, committed)
    }

    /// Record `observations` and announce the changes one message each
    ///
    /// Announcements go out even if the commit failed; the commit error is
    /// returned afterwards.
    pub async fn apply(
        &mut self,
        observations: &[Observation],
        now: DateTime<Utc>,
    ) -> Result<Vec<Outcome>> {
        let (outcomes, committed) = self.record(observations, now).await;
        self.notify_outcomes(&outcomes, now).await;
        committed.map(|()| outcomes)
    }

    /// Send one alert per outcome the policy wants announced
    pub async fn notify_outcomes(&self, outcomes: &[Outcome], now: DateTime<Utc>) {
        for outcome in outcomes {
            let Some(audience) = self.config.notifications.audience_for(outcome) else {
                continue;
            };
            let text = report::change_alert(outcome, &self.config.currency, now);
            self.send_best_effort(audience, &text).await;
        }
    }

    /// Send a message, propagating delivery errors
    pub async fn send(&self, audience: Audience, text: &str) -> Result<()> {
        self.notifier.send(audience, text).await
    }

    /// Send a message, logging delivery errors
    pub async fn send_best_effort(&self, audience: Audience, text: &str) {
        if let Err(e) = self.notifier.send(audience, text).await {
            error!(
                "Failed to send message to {} via {}: {}",
                audience,
                self.notifier.channel_name(),
                e
            );
        }
    }
}

impl std::fmt::Debug for MonitorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorContext")
            .field("source", &self.source.as_ref().map(|s| s.source_name()))
            .field("notifier", &self.notifier.channel_name())
            .field("balances", &self.balances)
            .field("unsaved", &self.unsaved)
            .finish()
    }
}
