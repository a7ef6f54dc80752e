//! Integration tests for store failures during scheduling and sweeping.

mod common;

use common::{fixtures::AccountBuilder, TestHarness};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wakepush_scheduler::{spawn_sweepers, ScheduleStore, SchedulerError, SweepConfig};

#[tokio::test]
async fn schedule_surfaces_store_failure() {
    let harness = TestHarness::with_slot_count(1);
    let (account, device) = AccountBuilder::new().build();
    harness.faults.fail_writes(true);

    let result = harness
        .scheduler
        .schedule_recurring_notification(&account, &device)
        .await;
    assert!(matches!(result, Err(SchedulerError::Connection(_))));
    assert!(harness
        .scheduler
        .cancel_recurring_notification(&account, &device)
        .await
        .is_err());
    assert_eq!(harness.store.slot_len(0), 0);

    harness.faults.fail_writes(false);
    harness
        .scheduler
        .schedule_recurring_notification(&account, &device)
        .await
        .unwrap();
    assert_eq!(harness.store.slot_len(0), 1);
}

#[tokio::test]
async fn sweep_surfaces_cursor_failure() {
    let harness = TestHarness::with_slot_count(4);
    harness.store.set_cursor(2).await.unwrap();
    harness.faults.fail_next_cursor_ops(1);

    let result = harness.worker.process_next_slot().await;
    assert!(matches!(result, Err(SchedulerError::Connection(_))));
    assert_eq!(harness.store.get_cursor().await.unwrap(), 2);

    assert_eq!(harness.worker.process_next_slot().await.unwrap(), 0);
    assert_eq!(harness.store.get_cursor().await.unwrap(), 3);
}

#[tokio::test]
async fn sweep_surfaces_pop_failure_and_keeps_entries() {
    let harness = TestHarness::with_slot_count(1);
    let (account, device) = AccountBuilder::new().build();
    harness.directory.insert(account.clone());
    harness
        .scheduler
        .schedule_recurring_notification(&account, &device)
        .await
        .unwrap();
    harness.clock.advance(Duration::from_secs(30));

    harness.faults.fail_pops(true);
    assert!(matches!(
        harness.worker.process_next_slot().await,
        Err(SchedulerError::Connection(_))
    ));
    assert_eq!(harness.sender.attempts(), 0);
    assert_eq!(harness.store.slot_len(0), 1);

    // Nothing was popped, so the next visit still finds the entry.
    harness.faults.fail_pops(false);
    assert_eq!(harness.worker.process_next_slot().await.unwrap(), 1);
}

#[tokio::test]
async fn failed_rearm_still_counts_as_sent() {
    let harness = TestHarness::with_slot_count(1);
    let (first, first_device) = AccountBuilder::new().build();
    let (second, second_device) = AccountBuilder::new().build();
    for (account, device) in [(&first, &first_device), (&second, &second_device)] {
        harness.directory.insert(account.clone());
        harness
            .scheduler
            .schedule_recurring_notification(account, device)
            .await
            .unwrap();
    }
    harness.clock.advance(Duration::from_secs(30));

    harness.faults.fail_writes(true);
    assert_eq!(harness.worker.process_next_slot().await.unwrap(), 2);

    assert_eq!(harness.sender.sent().len(), 2);
    assert_eq!(harness.store.slot_len(0), 0);
    assert!(!harness
        .scheduler
        .is_recurring_notification_scheduled(&first, &first_device)
        .await
        .unwrap());
}

#[tokio::test(start_paused = true)]
async fn sweeper_keeps_ticking_after_failed_tick() {
    let harness = TestHarness::with_slot_count(1000);
    harness.faults.fail_next_cursor_ops(1);
    let config = SweepConfig {
        batch_limit: 10,
        tick_interval: Duration::from_millis(100),
        workers: 1,
    };

    let handle = spawn_sweepers(harness.worker.clone(), &config, CancellationToken::new());

    // Five ticks in 450ms; the first one fails without moving the cursor.
    tokio::time::sleep(Duration::from_millis(450)).await;
    assert_eq!(harness.store.get_cursor().await.unwrap(), 4);

    handle.shutdown().await;
}
