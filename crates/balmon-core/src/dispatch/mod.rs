//! Command parsing and dispatch
//!
//! Inbound text is parsed once into a [`Command`] through [`COMMAND_TABLE`]
//! and then handled by [`CommandDispatcher`]. Anything that is not in the
//! table becomes [`Command::Unrecognized`]; malformed arguments become
//! [`Command::Invalid`] at parse time, so handlers only ever see validated
//! input.
//!
//! ## Commands
//!
//! | Text                                         | Command        |
//! |----------------------------------------------|----------------|
//! | `/start`, `/help`                            | `Help`         |
//! | `/status`                                    | `Status`       |
//! | `/check`                                     | `Check`        |
//! | `/balance`, `/set_balance`, `/set-balance`   | `SetBalance`   |
//!
//! Names are case-insensitive and may carry a `@botname` suffix, as group
//! chats send them.

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::context::MonitorContext;
use crate::engine::Observation;
use crate::error::{Error, Result};
use crate::report;
use crate::traits::{Audience, InboundMessage};

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show the command list and mode
    Help,
    /// Show the last known balances
    Status,
    /// Observe every location now and report
    Check,
    /// Record a balance by hand
    SetBalance {
        /// Location name as typed; `None` means the default location
        location: Option<String>,
        /// New balance
        amount: u64,
    },
    /// A known command with unusable arguments
    Invalid {
        /// What was wrong, shown to the sender
        reason: String,
    },
    /// Not a known command
    Unrecognized {
        /// The first word of the message
        name: String,
    },
}

/// What a command name resolves to before its arguments are looked at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Help,
    Status,
    Check,
    SetBalance,
}

/// Command names and the command each one selects
pub const COMMAND_TABLE: &[(&str, CommandKind)] = &[
    ("start", CommandKind::Help),
    ("help", CommandKind::Help),
    ("status", CommandKind::Status),
    ("check", CommandKind::Check),
    ("balance", CommandKind::SetBalance),
    ("set_balance", CommandKind::SetBalance),
    ("set-balance", CommandKind::SetBalance),
];

/// Look up a command name (without the leading `/`)
pub fn lookup(name: &str) -> Option<CommandKind> {
    COMMAND_TABLE
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
        .map(|(_, kind)| *kind)
}

/// Parse message text into a command
///
/// Returns `None` for empty text (stickers, photos, joins), which is never
/// answered.
pub fn parse(text: &str) -> Option<Command> {
    let mut tokens = text.split_whitespace();
    let head = tokens.next()?;
    let args: Vec<&str> = tokens.collect();

    let Some(name) = head.strip_prefix('/') else {
        return Some(Command::Unrecognized {
            name: head.to_string(),
        });
    };
    let name = name.split('@').next().unwrap_or(name);

    let command = match lookup(name) {
        Some(CommandKind::Help) => Command::Help,
        Some(CommandKind::Status) => Command::Status,
        Some(CommandKind::Check) => Command::Check,
        Some(CommandKind::SetBalance) => parse_set_balance(&args),
        None => Command::Unrecognized {
            name: head.to_string(),
        },
    };
    Some(command)
}

/// `[location words...] <amount>`
fn parse_set_balance(args: &[&str]) -> Command {
    let Some((amount, location)) = args.split_last() else {
        return Command::Invalid {
            reason: "Please provide amount.".to_string(),
        };
    };

    let amount = match amount.parse::<u64>() {
        Ok(amount) => amount,
        Err(_) => {
            return Command::Invalid {
                reason: format!("Invalid amount: {}", amount),
            };
        }
    };

    let location = (!location.is_empty()).then(|| location.join(" "));
    Command::SetBalance { location, amount }
}

/// Handles parsed commands against a [`MonitorContext`]
///
/// Replies go back to the audience the message came from.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandDispatcher;

impl CommandDispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Parse and handle one message
    ///
    /// Never fails: a handler error is logged and answered with an apology.
    /// Returns the command that was handled, or `None` if the message was
    /// ignored.
    pub async fn dispatch(
        &self,
        ctx: &mut MonitorContext,
        message: &InboundMessage,
    ) -> Option<Command> {
        let Some(audience) = message.audience else {
            debug!("Ignoring message {} from unknown chat", message.cursor);
            return None;
        };
        let command = parse(&message.text)?;

        info!("Command received from {}: {:?}", audience, command);

        if let Command::Unrecognized { name } = &command
            && audience == Audience::Secondary
        {
            debug!("Ignoring unrecognized command {:?} from group", name);
            return None;
        }

        if let Err(e) = self.handle(ctx, audience, &command).await {
            error!("Failed to handle {:?}: {}", command, e);
            ctx.send_best_effort(audience, &report::apology()).await;
        }

        Some(command)
    }

    async fn handle(
        &self,
        ctx: &mut MonitorContext,
        reply_to: Audience,
        command: &Command,
    ) -> Result<()> {
        match command {
            Command::Help => self.handle_help(ctx, reply_to).await,
            Command::Status => self.handle_status(ctx, reply_to).await,
            Command::Check => self.handle_check(ctx, reply_to).await,
            Command::SetBalance { location, amount } => {
                self.handle_set_balance(ctx, reply_to, location.as_deref(), *amount)
                    .await
            }
            Command::Invalid { reason } => {
                ctx.send(reply_to, &report::invalid_command(reason)).await
            }
            Command::Unrecognized { .. } => ctx.send(reply_to, &report::unknown_command()).await,
        }
    }

    async fn handle_help(&self, ctx: &MonitorContext, reply_to: Audience) -> Result<()> {
        let config = ctx.config();
        let text = report::help(
            ctx.is_automatic(),
            config.schedule.check_interval(),
            &config.locations,
        );
        ctx.send(reply_to, &text).await
    }

    async fn handle_status(&self, ctx: &MonitorContext, reply_to: Audience) -> Result<()> {
        let config = ctx.config();
        let text = report::status_report(
            &config.locations,
            ctx.balances(),
            &config.currency,
            Utc::now(),
        );
        ctx.send(reply_to, &text).await
    }

    /// Observe everything now and answer with one aggregated report
    ///
    /// Changes found here are not announced individually, and the
    /// automatic pass timer is left alone.
    async fn handle_check(&self, ctx: &mut MonitorContext, reply_to: Audience) -> Result<()> {
        if !ctx.is_automatic() {
            let text = report::manual_instructions(&ctx.config().locations);
            return ctx.send(reply_to, &text).await;
        }

        ctx.send(reply_to, &report::check_started()).await?;

        let observations = ctx.observe_all().await;
        let now = Utc::now();
        let (_, committed) = ctx.record(&observations, now).await;

        let text = report::check_report(&observations, &ctx.config().currency, now);
        ctx.send(reply_to, &text).await?;

        if let Err(e) = committed {
            warn!("Checked balances not saved yet, next commit retries: {}", e);
        }
        Ok(())
    }

    async fn handle_set_balance(
        &self,
        ctx: &mut MonitorContext,
        reply_to: Audience,
        location: Option<&str>,
        amount: u64,
    ) -> Result<()> {
        let config = ctx.config();
        let resolved = match location {
            Some(name) => config.find_location(name),
            None => config.default_location(),
        };
        let Some(resolved) = resolved else {
            let text = report::unknown_location(location.unwrap_or_default(), &config.locations);
            return ctx.send(reply_to, &text).await;
        };
        let name = resolved.name.clone();

        let now = Utc::now();
        let outcomes = ctx.apply(&[Observation::value(&name, amount)], now).await?;
        let outcome = outcomes
            .first()
            .ok_or_else(|| Error::Other(format!("No outcome for manual balance of {}", name)))?;

        let text = report::set_confirmation(outcome, &ctx.config().currency, now);
        ctx.send(reply_to, &text).await
    }
}
