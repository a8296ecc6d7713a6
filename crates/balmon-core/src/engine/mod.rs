//! Reconciliation engine
//!
//! The engine turns a batch of observations plus the current balances into
//! a batch of outcomes and an updated balance snapshot. It has no side
//! effects: persisting the snapshot and sending notifications are up to the
//! caller ([`MonitorContext`](crate::context::MonitorContext)).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐
//! │ ValueSource │─── Observation ───┐
//! └─────────────┘                   │
//!                                   ▼
//!                          ┌────────────────┐      ┌─────────────┐
//!    BalanceMap ──────────▶│  reconcile()   │─────▶│ BalanceMap' │──▶ StateStore
//!                          └────────────────┘      └─────────────┘
//!                                   │
//!                                   ▼
//!                              Vec<Outcome> ──▶ NotificationPolicy ──▶ Notifier
//! ```
//!
//! ## Classification
//!
//! 1. Failed reading: skipped, state untouched, no outcome
//! 2. No previous value and new > 0: `FirstSeen`
//! 3. New equals previous (missing counts as 0): `Unchanged`
//! 4. New above previous: `Increased`
//! 5. Otherwise: `Decreased`
//!
//! Every successful reading refreshes `observed_at`, including `Unchanged`.

mod policy;

pub use policy::NotificationPolicy;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::traits::{BalanceMap, LocationBalance};

/// Result of a single observation attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reading {
    /// The source reported a balance
    Value(u64),
    /// The source could not produce a balance this time
    Failed {
        /// Why the observation failed
        reason: String,
    },
}

/// One location's observation in a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Location name
    pub location: String,
    /// What the source reported
    pub reading: Reading,
}

impl Observation {
    /// A successful observation
    pub fn value(location: impl Into<String>, value: u64) -> Self {
        Self {
            location: location.into(),
            reading: Reading::Value(value),
        }
    }

    /// A failed observation
    pub fn failed(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            reading: Reading::Failed {
                reason: reason.into(),
            },
        }
    }

    /// The observed value, if the observation succeeded
    pub fn observed_value(&self) -> Option<u64> {
        match self.reading {
            Reading::Value(value) => Some(value),
            Reading::Failed { .. } => None,
        }
    }
}

/// How a new value relates to the stored one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// First positive value for a location with no stored state
    FirstSeen,
    /// Same value as stored
    Unchanged,
    /// Value went up
    Increased,
    /// Value went down
    Decreased,
}

/// Per-location result of a reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Location name
    pub location: String,
    /// Stored value before this pass, if any
    pub previous_value: Option<u64>,
    /// Observed value
    pub new_value: u64,
    /// `new_value - previous_value` (missing previous counts as 0)
    pub delta: i64,
    /// Change classification
    pub classification: Classification,
}

impl Outcome {
    /// Whether the value moved
    pub fn is_change(&self) -> bool {
        self.classification != Classification::Unchanged
    }
}

/// Outcomes of a pass plus the snapshot they produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// One outcome per successful observation, in input order
    pub outcomes: Vec<Outcome>,
    /// Updated balances
    pub state: BalanceMap,
}

impl Reconciliation {
    /// Outcomes whose value moved
    pub fn changes(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| o.is_change())
    }
}

/// Reconcile a batch of observations against the current balances
///
/// Locations present in `current` but missing from `observations` are
/// carried over untouched. If a location is observed twice in one batch, the
/// second observation is compared against the first.
pub fn reconcile(
    observations: &[Observation],
    current: &BalanceMap,
    now: DateTime<Utc>,
) -> Reconciliation {
    let mut state = current.clone();
    let mut outcomes = Vec::with_capacity(observations.len());

    for observation in observations {
        let new_value = match &observation.reading {
            Reading::Value(value) => *value,
            Reading::Failed { reason } => {
                debug!(
                    "Skipping {}: observation failed ({})",
                    observation.location, reason
                );
                continue;
            }
        };

        let previous_value = state.get(&observation.location).map(|b| b.value);
        let classification = classify(previous_value, new_value);
        let delta = signed(new_value) - signed(previous_value.unwrap_or(0));

        state.insert(
            observation.location.clone(),
            LocationBalance::observed(new_value, now),
        );

        outcomes.push(Outcome {
            location: observation.location.clone(),
            previous_value,
            new_value,
            delta,
            classification,
        });
    }

    Reconciliation { outcomes, state }
}

fn classify(previous: Option<u64>, new_value: u64) -> Classification {
    match previous {
        None if new_value > 0 => Classification::FirstSeen,
        _ => {
            let previous = previous.unwrap_or(0);
            if new_value == previous {
                Classification::Unchanged
            } else if new_value > previous {
                Classification::Increased
            } else {
                Classification::Decreased
            }
        }
    }
}

fn signed(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        "2025-03-01T10:00:00Z".parse().unwrap()
    }

    fn earlier() -> DateTime<Utc> {
        "2025-03-01T07:00:00Z".parse().unwrap()
    }

    fn stored(entries: &[(&str, u64)]) -> BalanceMap {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), LocationBalance::observed(*value, earlier())))
            .collect()
    }

    #[test]
    fn test_first_positive_value_is_first_seen() {
        let result = reconcile(&[Observation::value("A", 200)], &BalanceMap::new(), now());

        assert_eq!(result.outcomes.len(), 1);
        let outcome = &result.outcomes[0];
        assert_eq!(outcome.classification, Classification::FirstSeen);
        assert_eq!(outcome.previous_value, None);
        assert_eq!(outcome.delta, 200);
        assert_eq!(result.state["A"], LocationBalance::observed(200, now()));
    }

    #[test]
    fn test_first_zero_value_is_unchanged() {
        let result = reconcile(&[Observation::value("A", 0)], &BalanceMap::new(), now());

        let outcome = &result.outcomes[0];
        assert_eq!(outcome.classification, Classification::Unchanged);
        assert_eq!(outcome.delta, 0);
        assert_eq!(result.state["A"].value, 0);
        assert!(result.changes().next().is_none());
    }

    #[test]
    fn test_same_value_refreshes_timestamp() {
        let current = stored(&[("A", 100)]);
        let result = reconcile(&[Observation::value("A", 100)], &current, now());

        assert_eq!(result.outcomes[0].classification, Classification::Unchanged);
        assert_eq!(result.outcomes[0].delta, 0);
        assert_eq!(result.state["A"].observed_at, Some(now()));
    }

    #[test]
    fn test_increase_and_decrease() {
        let current = stored(&[("A", 100), ("B", 500)]);
        let result = reconcile(
            &[Observation::value("A", 150), Observation::value("B", 20)],
            &current,
            now(),
        );

        assert_eq!(result.outcomes[0].classification, Classification::Increased);
        assert_eq!(result.outcomes[0].delta, 50);
        assert_eq!(result.outcomes[1].classification, Classification::Decreased);
        assert_eq!(result.outcomes[1].delta, -480);
        assert_eq!(result.state["B"].value, 20);
    }

    #[test]
    fn test_failed_observation_leaves_state_alone() {
        let current = stored(&[("A", 100)]);
        let result = reconcile(&[Observation::failed("A", "blocked")], &current, now());

        assert!(result.outcomes.is_empty());
        assert_eq!(result.state, current);
    }

    #[test]
    fn test_unobserved_locations_are_carried_over() {
        let current = stored(&[("A", 100), ("B", 7)]);
        let result = reconcile(&[Observation::value("A", 100)], &current, now());

        assert_eq!(result.outcomes.len(), 1);
        assert_eq!(result.state["B"], current["B"]);
    }

    #[test]
    fn test_outcomes_keep_batch_order() {
        let observations = vec![
            Observation::value("Zeta", 1),
            Observation::failed("Mid", "timeout"),
            Observation::value("Alpha", 900),
        ];
        let result = reconcile(&observations, &BalanceMap::new(), now());

        let names: Vec<_> = result.outcomes.iter().map(|o| o.location.as_str()).collect();
        assert_eq!(names, vec!["Zeta", "Alpha"]);
    }

    #[test]
    fn test_repeated_location_compares_against_earlier_reading() {
        let observations = vec![Observation::value("A", 10), Observation::value("A", 30)];
        let result = reconcile(&observations, &BalanceMap::new(), now());

        assert_eq!(result.outcomes[1].previous_value, Some(10));
        assert_eq!(result.outcomes[1].classification, Classification::Increased);
        assert_eq!(result.state["A"].value, 30);
    }
}
