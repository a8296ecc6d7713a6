use serde::{Deserialize, Serialize};

use super::{Classification, Outcome};
use crate::traits::Audience;

/// Decides, per classification, whether an outcome is announced and to whom
///
/// `Unchanged` outcomes are never announced. A `None` audience turns a
/// classification off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPolicy {
    /// First positive value for a new location (a refill from nothing)
    #[serde(default = "default_audience")]
    pub on_first_seen: Option<Audience>,

    /// Balance went up
    #[serde(default = "default_audience")]
    pub on_increase: Option<Audience>,

    /// Balance went down (withdrawals)
    #[serde(default = "default_audience")]
    pub on_decrease: Option<Audience>,
}

impl NotificationPolicy {
    /// Set the audience for withdrawals, or `None` to keep them quiet
    pub fn with_decrease(mut self, audience: Option<Audience>) -> Self {
        self.on_decrease = audience;
        self
    }

    /// Audience to notify about `outcome`, if any
    pub fn audience_for(&self, outcome: &Outcome) -> Option<Audience> {
        match outcome.classification {
            Classification::FirstSeen => self.on_first_seen,
            Classification::Increased => self.on_increase,
            Classification::Decreased => self.on_decrease,
            Classification::Unchanged => None,
        }
    }
}

impl Default for NotificationPolicy {
    fn default() -> Self {
        Self {
            on_first_seen: default_audience(),
            on_increase: default_audience(),
            on_decrease: default_audience(),
        }
    }
}

fn default_audience() -> Option<Audience> {
    Some(Audience::Secondary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(classification: Classification) -> Outcome {
        Outcome {
            location: "A".to_string(),
            previous_value: Some(1),
            new_value: 2,
            delta: 1,
            classification,
        }
    }

    #[test]
    fn test_default_policy_announces_changes_to_group() {
        let policy = NotificationPolicy::default();

        assert_eq!(
            policy.audience_for(&outcome(Classification::FirstSeen)),
            Some(Audience::Secondary)
        );
        assert_eq!(
            policy.audience_for(&outcome(Classification::Increased)),
            Some(Audience::Secondary)
        );
        assert_eq!(
            policy.audience_for(&outcome(Classification::Decreased)),
            Some(Audience::Secondary)
        );
        assert_eq!(policy.audience_for(&outcome(Classification::Unchanged)), None);
    }

    #[test]
    fn test_withdrawal_toggle() {
        let quiet = NotificationPolicy::default().with_decrease(None);
        assert_eq!(quiet.audience_for(&outcome(Classification::Decreased)), None);

        let personal = NotificationPolicy::default().with_decrease(Some(Audience::Primary));
        assert_eq!(
            personal.audience_for(&outcome(Classification::Decreased)),
            Some(Audience::Primary)
        );
    }
}
