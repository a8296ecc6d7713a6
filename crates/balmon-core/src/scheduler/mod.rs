//! Cooperative scheduler
//!
//! One loop drives both command handling and the periodic automatic pass,
//! so the two never overlap and the state store is only ever written from
//! here.
//!
//! ## Tick
//!
//! 1. Poll the transport for messages after the cursor
//! 2. Skip messages at or below the cursor (redelivery), advance the cursor,
//!    dispatch the rest one by one
//! 3. If the check interval has elapsed since the last automatic pass, run
//!    one and restart the interval
//! 4. Report a poll failure, if there was one
//!
//! A manual `/check` goes through the dispatcher and does not restart the
//! interval.

use chrono::Utc;
use std::future::Future;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::context::MonitorContext;
use crate::dispatch::CommandDispatcher;
use crate::error::Result;
use crate::report;
use crate::traits::{Audience, CommandTransport, InboundMessage};

/// Drives a [`MonitorContext`] from a [`CommandTransport`] and a timer
pub struct Scheduler {
    ctx: MonitorContext,
    transport: Box<dyn CommandTransport>,
    dispatcher: CommandDispatcher,
    cursor: Option<i64>,
    last_pass: Instant,
}

impl Scheduler {
    /// Create a scheduler; the first automatic pass is one interval away
    pub fn new(ctx: MonitorContext, transport: Box<dyn CommandTransport>) -> Self {
        Self {
            ctx,
            transport,
            dispatcher: CommandDispatcher::new(),
            cursor: None,
            last_pass: Instant::now(),
        }
    }

    /// Start from a known cursor; messages at or below it are skipped
    pub fn with_cursor(mut self, cursor: i64) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Highest message cursor seen so far
    pub fn cursor(&self) -> Option<i64> {
        self.cursor
    }

    /// When the last automatic pass finished (or when the scheduler started)
    pub fn last_pass(&self) -> Instant {
        self.last_pass
    }

    pub fn context(&self) -> &MonitorContext {
        &self.ctx
    }

    /// Whether the automatic pass is due
    pub fn pass_due(&self) -> bool {
        self.last_pass.elapsed() >= self.ctx.config().schedule.check_interval()
    }

    /// Run one full tick
    pub async fn tick(&mut self) -> Result<()> {
        let polled = self.transport.poll(self.cursor).await;
        self.finish_tick(polled).await
    }

    /// Steps 2-4 of a tick, given the poll result
    async fn finish_tick(&mut self, polled: Result<Vec<InboundMessage>>) -> Result<()> {
        let poll_error = match polled {
            Ok(messages) => {
                self.process_messages(messages).await;
                None
            }
            Err(e) => Some(e),
        };

        if self.pass_due() {
            self.run_automatic_pass().await;
            self.last_pass = Instant::now();
        }

        match poll_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Dispatch new messages in cursor order; returns how many were dispatched
    pub async fn process_messages(&mut self, messages: Vec<InboundMessage>) -> usize {
        let mut dispatched = 0;

        for message in messages {
            if let Some(cursor) = self.cursor
                && message.cursor <= cursor
            {
                debug!(
                    "Skipping already seen message {} (cursor {})",
                    message.cursor, cursor
                );
                continue;
            }
            self.cursor = Some(message.cursor);

            if message.audience.is_none() {
                debug!("Ignoring message {} from unknown chat", message.cursor);
                continue;
            }

            self.dispatcher.dispatch(&mut self.ctx, &message).await;
            dispatched += 1;
        }

        dispatched
    }

    /// Observe, reconcile, commit and announce; or remind, in manual mode
    ///
    /// Failures are logged only.
    pub async fn run_automatic_pass(&mut self) {
        if !self.ctx.is_automatic() {
            info!("Sending manual check reminder");
            let text = report::reminder(self.ctx.config().schedule.check_interval());
            self.ctx.send_best_effort(Audience::Primary, &text).await;
            return;
        }

        info!("Running automatic balance check");
        let observations = self.ctx.observe_all().await;
        let observed = observations
            .iter()
            .filter(|o| o.observed_value().is_some())
            .count();

        match self.ctx.apply(&observations, Utc::now()).await {
            Ok(outcomes) => {
                let changed = outcomes.iter().filter(|o| o.is_change()).count();
                info!(
                    "Automatic check done: {}/{} observed, {} changed",
                    observed,
                    observations.len(),
                    changed
                );
            }
            Err(e) => error!("Automatic check could not be saved: {}", e),
        }
    }

    /// Run ticks until `shutdown` resolves
    ///
    /// Shutdown is only observed while polling or backing off, so a check or
    /// command in progress always completes.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let backoff = self.ctx.config().schedule.error_backoff();

        info!(
            "Scheduler started ({} mode, check every {:?})",
            if self.ctx.is_automatic() { "automatic" } else { "manual" },
            self.ctx.config().schedule.check_interval()
        );

        loop {
            let polled = tokio::select! {
                polled = self.transport.poll(self.cursor) => polled,
                _ = &mut shutdown => break,
            };

            if let Err(e) = self.finish_tick(polled).await {
                error!("Tick failed: {}; retrying in {:?}", e, backoff);
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = &mut shutdown => break,
                }
            }
        }

        info!("Shutdown signal received, scheduler stopped");
        Ok(())
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("ctx", &self.ctx)
            .field("cursor", &self.cursor)
            .field("last_pass", &self.last_pass)
            .finish()
    }
}
