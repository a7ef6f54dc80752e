//! Common test utilities for scheduler integration tests.

#![allow(dead_code)]

pub mod fixtures;

use fixtures::{FlakyStore, RecordingSender};
use std::sync::Arc;
use wakepush_scheduler::{
    config::{ScheduleConfig, SweepConfig},
    InMemoryAccountDirectory, InMemoryScheduleStore, KeySpace, ManualClock, NotificationScheduler,
    NotificationWorker,
};

/// Start time for every harness clock.
pub const NOW: u64 = 1_700_000_000_000;

/// Complete test setup with all components wired together.
pub struct TestHarness {
    /// Backing store, for inspecting and seeding state directly.
    pub store: Arc<InMemoryScheduleStore>,
    /// What the scheduler talks to; healthy unless told otherwise.
    pub faults: Arc<FlakyStore>,
    pub clock: Arc<ManualClock>,
    pub directory: Arc<InMemoryAccountDirectory>,
    pub sender: Arc<RecordingSender>,
    pub scheduler: Arc<NotificationScheduler>,
    pub worker: Arc<NotificationWorker>,
}

impl TestHarness {
    /// Creates a harness over the full cluster key space.
    pub fn new() -> Self {
        Self::with_config(KeySpace::CLUSTER, ScheduleConfig::default(), SweepConfig::default())
    }

    /// Creates a harness over a small key space.
    pub fn with_slot_count(slot_count: u16) -> Self {
        Self::with_config(
            KeySpace::new(slot_count).unwrap(),
            ScheduleConfig {
                slot_count,
                ..ScheduleConfig::default()
            },
            SweepConfig::default(),
        )
    }

    /// Creates a harness with custom configuration.
    pub fn with_config(
        key_space: KeySpace,
        schedule_config: ScheduleConfig,
        sweep_config: SweepConfig,
    ) -> Self {
        let store = Arc::new(InMemoryScheduleStore::new(key_space));
        let faults = Arc::new(FlakyStore::new(store.clone()));
        let clock = Arc::new(ManualClock::new(NOW));
        let directory = Arc::new(InMemoryAccountDirectory::new());
        let sender = Arc::new(RecordingSender::new());

        let scheduler = Arc::new(
            NotificationScheduler::new(faults.clone(), clock.clone(), schedule_config).unwrap(),
        );
        let worker = Arc::new(NotificationWorker::new(
            scheduler.clone(),
            directory.clone(),
            sender.clone(),
            sweep_config.batch_limit,
        ));

        Self {
            store,
            faults,
            clock,
            directory,
            sender,
            scheduler,
            worker,
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
