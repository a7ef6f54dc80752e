//! Scheduling API for recurring wake-up notifications.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::config::ScheduleConfig;
use crate::destination::{endpoint_key, Destination};
use crate::error::{Result, SchedulerError};
use crate::identity::{Account, Device};
use crate::slot::KeySpace;
use crate::store::ScheduleStore;

/// Schedules and pops recurring wake-up notifications.
///
/// Scheduling is an upsert: scheduling a device that is already pending moves
/// its due time instead of adding a second entry.
pub struct NotificationScheduler {
    store: Arc<dyn ScheduleStore>,
    clock: Arc<dyn Clock>,
    config: ScheduleConfig,
}

impl NotificationScheduler {
    /// Creates a scheduler over `store`.
    ///
    /// Fails if `config.slot_count` does not describe the store's key space.
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        clock: Arc<dyn Clock>,
        config: ScheduleConfig,
    ) -> Result<Self> {
        let configured = config.key_space()?;
        let actual = store.key_space();
        if configured != actual {
            return Err(SchedulerError::Config(format!(
                "schedule slot_count is {}, but the store has {} slots",
                configured.slot_count(),
                actual.slot_count()
            )));
        }

        Ok(Self {
            store,
            clock,
            config,
        })
    }

    /// Key space of the underlying store.
    #[must_use]
    pub fn key_space(&self) -> KeySpace {
        self.store.key_space()
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ScheduleStore> {
        &self.store
    }

    /// Partitioning key for a device.
    #[must_use]
    pub fn endpoint_key(&self, account: &Account, device: &Device) -> String {
        endpoint_key(account, device)
    }

    /// Slot a device's notifications are kept in.
    #[must_use]
    pub fn slot_for(&self, account: &Account, device: &Device) -> u16 {
        self.key_space().slot_of(&endpoint_key(account, device))
    }

    /// Schedules the first wake-up for a device, due after the initial delay.
    pub async fn schedule_recurring_notification(
        &self,
        account: &Account,
        device: &Device,
    ) -> Result<()> {
        self.schedule_after(account, device, self.config.initial_delay)
            .await
    }

    /// Schedules the next wake-up for a device, due after the recurrence
    /// interval.
    pub async fn reschedule_recurring_notification(
        &self,
        account: &Account,
        device: &Device,
    ) -> Result<()> {
        self.schedule_after(account, device, self.config.recur_interval)
            .await
    }

    #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
    async fn schedule_after(&self, account: &Account, device: &Device, delay: Duration) -> Result<()> {
        let slot = self.slot_for(account, device);
        let destination = Destination::for_device(account, device).encode();
        let due = self
            .clock
            .now_millis()
            .saturating_add(delay.as_millis() as u64);

        self.store.upsert_due(slot, &destination, due).await?;

        tracing::debug!(slot, destination = %destination, due, "Scheduled wake-up");
        Ok(())
    }

    /// Cancels a device's pending wake-up. Returns whether one was pending.
    pub async fn cancel_recurring_notification(
        &self,
        account: &Account,
        device: &Device,
    ) -> Result<bool> {
        let slot = self.slot_for(account, device);
        let destination = Destination::for_device(account, device).encode();
        self.store.remove_due(slot, &destination).await
    }

    /// Due time of a device's pending wake-up, if any.
    pub async fn next_due_time(&self, account: &Account, device: &Device) -> Result<Option<u64>> {
        let slot = self.slot_for(account, device);
        let destination = Destination::for_device(account, device).encode();
        self.store.due_time(slot, &destination).await
    }

    /// Returns whether a device has a pending wake-up.
    pub async fn is_recurring_notification_scheduled(
        &self,
        account: &Account,
        device: &Device,
    ) -> Result<bool> {
        Ok(self.next_due_time(account, device).await?.is_some())
    }

    /// Pops up to `limit` destinations in `slot` that are due now, earliest
    /// first. An empty result means nothing is due.
    pub async fn get_pending_destinations(&self, slot: u16, limit: usize) -> Result<Vec<String>> {
        self.store
            .pop_due_before(slot, self.clock.now_millis(), limit)
            .await
    }

    /// Current time according to the scheduler's clock.
    #[must_use]
    pub fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }

    /// Scheduling configuration.
    #[must_use]
    pub const fn config(&self) -> &ScheduleConfig {
        &self.config
    }
}

impl std::fmt::Debug for NotificationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationScheduler")
            .field("key_space", &self.key_space())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
