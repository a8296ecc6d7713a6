//! Message formatting
//!
//! Every text the monitor sends is built here. Messages use Telegram's HTML
//! subset (`<b>`, `<a>`, `<code>`), so anything that comes from
//! configuration or user input goes through [`escape`] first.
//!
//! Times are rendered in UTC so that messages do not depend on the host's
//! timezone.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::config::LocationConfig;
use crate::engine::{Classification, Observation, Outcome, Reading};
use crate::traits::BalanceMap;

/// Escape text for Telegram's HTML parse mode
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Format an amount with `,` thousands separators
pub fn format_amount(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Format a signed change, always with a sign (`+50`, `-1,200`, `+0`)
pub fn format_delta(delta: i64) -> String {
    let sign = if delta < 0 { '-' } else { '+' };
    format!("{}{}", sign, format_amount(delta.unsigned_abs()))
}

/// Format a timestamp for display
pub fn format_time(at: DateTime<Utc>) -> String {
    at.format("%d.%m.%Y %H:%M UTC").to_string()
}

/// Format an elapsed span as `3h 5m` or `12m`
pub fn format_elapsed(elapsed: chrono::Duration) -> String {
    let minutes = elapsed.num_minutes().max(0);
    let hours = minutes / 60;
    if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else {
        format!("{}m", minutes)
    }
}

/// Human form of the automatic check interval (`3 hours`, `90 minutes`)
pub fn format_interval(interval: Duration) -> String {
    let secs = interval.as_secs();
    if secs >= 3600 && secs % 3600 == 0 {
        plural(secs / 3600, "hour")
    } else if secs >= 60 && secs % 60 == 0 {
        plural(secs / 60, "minute")
    } else {
        plural(secs, "second")
    }
}

fn plural(n: u64, unit: &str) -> String {
    if n == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", n, unit)
    }
}

/// Alert for a single changed location
pub fn change_alert(outcome: &Outcome, currency: &str, at: DateTime<Utc>) -> String {
    let location = escape(&outcome.location);
    let currency = escape(currency);
    let previous = outcome.previous_value.unwrap_or(0);
    let mut msg = String::new();

    match outcome.classification {
        Classification::FirstSeen | Classification::Increased => {
            msg.push_str(&format!(
                "<b>💰 Money Added to ATM!</b>\n\n\
                 📍 Location: {location}\n\
                 💵 Current Balance: {} {currency}\n\
                 📈 Added: {} {currency}\n\
                 🕐 Time: {}",
                format_amount(outcome.new_value),
                format_delta(outcome.delta),
                format_time(at),
            ));
            if previous > 0 {
                msg.push_str(&format!("\n\n⬆️ Previous: {} {currency}", format_amount(previous)));
            } else {
                msg.push_str("\n\n🎉 <b>ATM Refilled!</b>");
            }
        }
        Classification::Decreased => {
            msg.push_str(&format!(
                "<b>💸 Money Withdrawn from ATM</b>\n\n\
                 📍 Location: {location}\n\
                 💵 Current Balance: {} {currency}\n\
                 📉 Withdrawn: {} {currency}\n\
                 🕐 Time: {}\n\n\
                 ⬇️ Previous: {} {currency}",
                format_amount(outcome.new_value),
                format_delta(outcome.delta),
                format_time(at),
                format_amount(previous),
            ));
        }
        Classification::Unchanged => {
            msg.push_str(&format!(
                "📍 {location}: {} {currency} (no change)",
                format_amount(outcome.new_value)
            ));
        }
    }

    msg
}

/// Acknowledgement sent before a manual check starts
pub fn check_started() -> String {
    "🔄 Checking all ATMs now...".to_string()
}

/// Aggregated result of a manual check, one block per location
pub fn check_report(observations: &[Observation], currency: &str, at: DateTime<Utc>) -> String {
    let currency = escape(currency);
    let mut msg = String::from("<b>✅ ATM Check Complete</b>\n\n");
    let mut total: u64 = 0;
    let mut available = 0usize;

    for observation in observations {
        msg.push_str(&format!("📍 <b>{}</b>\n", escape(&observation.location)));
        match &observation.reading {
            Reading::Value(value) => {
                msg.push_str(&format!("   💰 {} {currency}", format_amount(*value)));
                if *value > 0 {
                    total = total.saturating_add(*value);
                    available += 1;
                } else {
                    msg.push_str(" ❌");
                }
                msg.push('\n');
            }
            Reading::Failed { .. } => msg.push_str("   ❌ Could not check\n"),
        }
        msg.push('\n');
    }

    msg.push_str(&format!("📊 <b>Total: {} {currency}</b>", format_amount(total)));
    if available > 0 {
        msg.push_str(&format!(
            " ({} ATM{})",
            available,
            if available > 1 { "s" } else { "" }
        ));
    }
    msg.push_str(&format!("\n🕐 Checked: {}", format_time(at)));
    msg
}

/// Last known balance of every configured location
pub fn status_report(
    locations: &[LocationConfig],
    balances: &BalanceMap,
    currency: &str,
    now: DateTime<Utc>,
) -> String {
    let currency = escape(currency);
    let mut msg = String::from("<b>📊 Current Status</b>\n");

    for location in locations {
        msg.push_str(&format!("\n📍 <b>{}</b>\n", escape(&location.name)));
        match balances.get(&location.name) {
            Some(balance) => {
                msg.push_str(&format!("💰 Balance: {} {currency}\n", format_amount(balance.value)));
                if let (Some(at), Some(age)) = (balance.observed_at, balance.age(now)) {
                    msg.push_str(&format!("🕐 Last Updated: {}\n", format_time(at)));
                    msg.push_str(&format!("⏱️ Time Since: {} ago\n", format_elapsed(age)));
                }
            }
            None => msg.push_str("💰 Balance: unknown\n"),
        }
        msg.push_str(&format!(
            "🔗 <a href=\"{}\">Check ATM Now</a>\n",
            escape(&location.url)
        ));
    }

    let has_data = locations.iter().any(|l| balances.contains_key(&l.name));
    if !has_data {
        msg.push_str("\n⚠️ No data yet. Use /check to start!");
    }

    msg.trim_end().to_string()
}

/// Confirmation for a manual `/balance` update
pub fn set_confirmation(outcome: &Outcome, currency: &str, at: DateTime<Utc>) -> String {
    let currency = escape(currency);
    let previous = outcome.previous_value.unwrap_or(0);
    let mut msg = String::new();

    msg.push_str(&format!(
        "<b>✅ Balance Updated</b>\n\n\
         📍 Location: {}\n\
         💰 Current Balance: {} {currency}\n\
         🕐 Time: {}",
        escape(&outcome.location),
        format_amount(outcome.new_value),
        format_time(at),
    ));

    match outcome.classification {
        Classification::Unchanged => msg.push_str("\n\nℹ️ No change from last check."),
        _ if previous == 0 && outcome.new_value > 0 => {
            msg.push_str("\n\n🎉 <b>Balance Available!</b>");
        }
        Classification::Increased | Classification::Decreased | Classification::FirstSeen => {
            let emoji = if outcome.delta > 0 { "📈" } else { "📉" };
            msg.push_str(&format!(
                "\n\n{emoji} <b>Change Detected!</b>\n\
                 Previous: {} {currency}\n\
                 Difference: {} {currency}",
                format_amount(previous),
                format_delta(outcome.delta),
            ));
        }
    }

    msg
}

/// Command list, shown for `/start` and `/help`
pub fn help(automatic: bool, interval: Duration, locations: &[LocationConfig]) -> String {
    let interval = format_interval(interval);
    let (mode, description, closing) = if automatic {
        (
            "🤖 <b>AUTOMATIC MODE</b>",
            format!("I automatically check the ATMs every {interval} and notify you of changes."),
            "I'll notify you when balance changes.",
        )
    } else {
        (
            "👤 <b>MANUAL MODE</b>",
            format!("I remind you to check every {interval}."),
            "Use /check to begin.",
        )
    };

    let names: Vec<String> = locations.iter().map(|l| escape(&l.name)).collect();

    format!(
        "<b>🏧 Bitcoin ATM Monitor</b>\n\n\
         Monitoring: {}\n\n\
         {mode}\n\
         {description}\n\n\
         <b>📋 Commands:</b>\n\
         /check - Check ATMs now\n\
         /balance [location] &lt;amount&gt; - Set balance manually (e.g., /balance 150)\n\
         /status - Show last known balances\n\
         /help - Show this message\n\n\
         Ready to start! {closing}",
        names.join(", "),
    )
}

/// Sent once when the daemon comes up
pub fn startup_banner(automatic: bool) -> String {
    let mode = if automatic {
        "automatic checking"
    } else {
        "manual reminders"
    };
    format!("🤖 <b>Bot is now running!</b>\n\nMode: {mode}\n\nUse /help to see commands.")
}

/// Periodic nudge in manual mode
pub fn reminder(interval: Duration) -> String {
    format!(
        "<b>⏰ Reminder: Check ATM Balance</b>\n\n\
         It's been {}! Time to check the Bitcoin ATM.\n\n\
         Use /check to get the link, then send me the balance.",
        format_interval(interval)
    )
}

/// Reply to `/check` in manual mode
pub fn manual_instructions(locations: &[LocationConfig]) -> String {
    let mut msg = String::from("<b>🔍 Time to Check the ATM</b>\n\n");
    for location in locations {
        msg.push_str(&format!(
            "📍 <b>{}</b>: <a href=\"{}\">Click here to check balance</a>\n",
            escape(&location.name),
            escape(&location.url)
        ));
    }
    msg.push_str(
        "\n<b>Instructions:</b>\n\
         1. Click a link above\n\
         2. Look for the available balance\n\
         3. Send me: /balance [location] [amount]\n\n\
         Example: <code>/balance 150</code>\n\n\
         💡 Tip: If there's no balance, send <code>/balance 0</code>",
    );
    msg
}

/// Reply to a malformed command
pub fn invalid_command(reason: &str) -> String {
    format!(
        "❌ {}\n\nExample: <code>/balance 150</code>\n(or <code>/balance 0</code> if no balance)",
        escape(reason)
    )
}

/// Reply to `/balance` naming a location that is not configured
pub fn unknown_location(name: &str, locations: &[LocationConfig]) -> String {
    let mut msg = format!("❌ Unknown location: <b>{}</b>\n\nKnown locations:", escape(name));
    for location in locations {
        msg.push_str(&format!("\n• {}", escape(&location.name)));
    }
    msg
}

/// Reply to an unrecognized command
pub fn unknown_command() -> String {
    "❓ Unknown command. Use /help to see available commands.".to_string()
}

/// Best-effort reply when handling a command failed
pub fn apology() -> String {
    "❌ An error occurred. Please try again.".to_string()
}
