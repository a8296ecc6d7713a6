//! Contract Test: Change Detection & Notification
//!
//! Constraints verified:
//! - A changed balance is persisted and announced to the policy's audience
//! - Re-observing the same balance is silent but refreshes the timestamp
//! - A zero balance on a fresh location is not an event
//! - A failed observation never touches stored state
//! - Withdrawal announcements follow the policy toggle

mod common;

use balmon_core::traits::{Audience, BalanceMap, LocationBalance};
use balmon_core::{Classification, Observation};
use chrono::{DateTime, Utc};
use common::*;

fn at(ts: &str) -> DateTime<Utc> {
    ts.parse().unwrap()
}

fn palas_at(value: u64) -> BalanceMap {
    let mut balances = BalanceMap::new();
    balances.insert(
        PALAS.to_string(),
        LocationBalance::observed(value, at("2025-01-09T09:00:00Z")),
    );
    balances
}

#[tokio::test]
async fn increase_is_announced_once_then_quiet() {
    let source = ScriptedSource::new();
    let notifier = RecordingNotifier::new();
    let store = FlakyStore::with_balances(palas_at(100));
    let mut ctx = context(test_config(), Some(&source), &notifier, &store).await;

    source.set(PALAS, 150);
    source.fail(GARII, "blocked");

    let observations = ctx.observe_all().await;
    let first = ctx.apply(&observations, at("2025-01-09T12:00:00Z")).await;
    let outcomes = tokio_test::assert_ok!(first);

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].classification, Classification::Increased);
    assert_eq!(outcomes[0].delta, 50);

    let group = notifier.sent_to(Audience::Secondary);
    assert_eq!(group.len(), 1, "Expected one group alert, got {:?}", group);
    assert!(group[0].contains("+50 RON"));
    assert!(notifier.sent_to(Audience::Primary).is_empty());
    assert_eq!(store.persisted().await[PALAS].value, 150);

    // Same value again: nothing to say, but the observation time moves on
    let later = at("2025-01-09T15:00:00Z");
    let observations = ctx.observe_all().await;
    let second = ctx.apply(&observations, later).await.unwrap();

    assert_eq!(second[0].classification, Classification::Unchanged);
    assert_eq!(notifier.sent().len(), 1, "Unchanged balance must not notify");
    assert_eq!(store.persisted().await[PALAS].observed_at, Some(later));
}

#[tokio::test]
async fn zero_on_fresh_location_is_not_an_event() {
    let notifier = RecordingNotifier::new();
    let store = FlakyStore::new();
    let mut ctx = context(test_config(), None, &notifier, &store).await;

    let outcomes = ctx
        .apply(&[Observation::value(PALAS, 0)], Utc::now())
        .await
        .unwrap();

    assert_eq!(outcomes[0].classification, Classification::Unchanged);
    assert!(notifier.sent().is_empty());
    assert_eq!(ctx.balances()[PALAS].value, 0);
}

#[tokio::test]
async fn first_positive_value_is_a_refill() {
    let notifier = RecordingNotifier::new();
    let store = FlakyStore::new();
    let mut ctx = context(test_config(), None, &notifier, &store).await;

    let outcomes = ctx
        .apply(&[Observation::value(GARII, 2500)], Utc::now())
        .await
        .unwrap();

    assert_eq!(outcomes[0].classification, Classification::FirstSeen);
    assert_eq!(outcomes[0].delta, 2500);
    let group = notifier.sent_to(Audience::Secondary);
    assert_eq!(group.len(), 1);
    assert!(group[0].contains("ATM Refilled"));
}

#[tokio::test]
async fn failed_observation_leaves_state_untouched() {
    let source = ScriptedSource::new();
    let notifier = RecordingNotifier::new();
    let initial = palas_at(100);
    let store = FlakyStore::with_balances(initial.clone());
    let mut ctx = context(test_config(), Some(&source), &notifier, &store).await;

    source.fail(PALAS, "Cloudflare challenge");
    source.fail(GARII, "timeout");

    let observations = ctx.observe_all().await;
    let outcomes = ctx.apply(&observations, Utc::now()).await.unwrap();

    assert!(outcomes.is_empty());
    assert_eq!(ctx.balances(), &initial);
    assert_eq!(store.save_count(), 0, "Nothing changed, nothing to write");
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn hanging_source_is_cut_off_by_observe_timeout() {
    let source = ScriptedSource::new();
    source.hang();
    let notifier = RecordingNotifier::new();
    let store = FlakyStore::new();
    let ctx = context(test_config(), Some(&source), &notifier, &store).await;

    let observations = ctx.observe_all().await;

    assert_eq!(observations.len(), 2);
    assert!(observations.iter().all(|o| o.observed_value().is_none()));
}

#[tokio::test]
async fn withdrawal_follows_policy_toggle() {
    let notifier = RecordingNotifier::new();

    let mut config = test_config();
    config.notifications = config.notifications.with_decrease(None);
    let store = FlakyStore::with_balances(palas_at(500));
    let mut quiet = context(config, None, &notifier, &store).await;

    quiet
        .apply(&[Observation::value(PALAS, 20)], Utc::now())
        .await
        .unwrap();
    assert!(notifier.sent().is_empty(), "Withdrawals are switched off");
    assert_eq!(quiet.balances()[PALAS].value, 20);

    let mut config = test_config();
    config.notifications = config.notifications.with_decrease(Some(Audience::Primary));
    let store = FlakyStore::with_balances(palas_at(500));
    let mut loud = context(config, None, &notifier, &store).await;

    loud
        .apply(&[Observation::value(PALAS, 20)], Utc::now())
        .await
        .unwrap();
    let alerts = notifier.sent_to(Audience::Primary);
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].contains("Withdrawn: -480 RON"));
}

#[tokio::test]
async fn failing_notifier_does_not_block_state() {
    let notifier = RecordingNotifier::new();
    notifier.set_failing(true);
    let store = FlakyStore::with_balances(palas_at(100));
    let mut ctx = context(test_config(), None, &notifier, &store).await;

    let outcomes = ctx
        .apply(&[Observation::value(PALAS, 300)], Utc::now())
        .await
        .unwrap();

    assert_eq!(outcomes[0].classification, Classification::Increased);
    assert_eq!(notifier.attempts(), 1, "Delivery is attempted once, not retried");
    assert_eq!(store.persisted().await[PALAS].value, 300);
}
