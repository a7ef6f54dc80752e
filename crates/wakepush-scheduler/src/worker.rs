//! Sweep worker.
//!
//! Each call to [`NotificationWorker::process_next_slot`] services one slot:
//! it claims the slot under the shared cursor (moving the cursor on), pops
//! whatever is due there and wakes the devices. A full sweep takes one call per
//! slot.
//!
//! # Concurrency
//!
//! Any number of workers, in any number of processes, may sweep the same
//! store. The atomic pop guarantees each due entry is handed to exactly one of
//! them. Claiming a slot is a single atomic step on the store, so concurrent
//! workers claim consecutive slots. The cursor is still only a fairness hint:
//! anything that rewrites it (an operator, or a store restored from an older
//! snapshot) makes the sweep skip or repeat slots for one cycle, and never
//! loses an entry.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use uuid::Uuid;

use crate::delivery::{PushNotification, PushSender};
use crate::destination::Destination;
use crate::error::Result;
use crate::identity::{Account, AccountDirectory, Device};
use crate::scheduler::NotificationScheduler;

/// What happened to one popped destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Notification sent.
    Sent,
    /// Entry could not be decoded.
    Corrupt,
    /// Account or device no longer exists, or the device has no token.
    Dropped,
    /// Device has not been seen recently enough to keep waking.
    Evicted,
    /// The push service failed.
    Failed,
}

/// Pops due destinations one slot at a time and wakes their devices.
pub struct NotificationWorker {
    scheduler: Arc<NotificationScheduler>,
    directory: Arc<dyn AccountDirectory>,
    sender: Arc<dyn PushSender>,
    batch_limit: usize,
}

impl NotificationWorker {
    /// Creates a worker popping at most `batch_limit` entries per slot visit.
    pub fn new(
        scheduler: Arc<NotificationScheduler>,
        directory: Arc<dyn AccountDirectory>,
        sender: Arc<dyn PushSender>,
        batch_limit: usize,
    ) -> Self {
        Self {
            scheduler,
            directory,
            sender,
            batch_limit,
        }
    }

    /// Claims the slot under the cursor, advancing the cursor, and services it.
    ///
    /// Returns the number of notifications sent. Per-entry problems are logged
    /// and never abort the batch; only store failures are returned. A slot
    /// whose pop fails is picked up again on the next sweep.
    pub async fn process_next_slot(&self) -> Result<usize> {
        let slot = self.scheduler.store().advance_cursor().await?;

        let due = self
            .scheduler
            .get_pending_destinations(slot, self.batch_limit)
            .await?;
        #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
        let batch_size = due.len() as f64;
        histogram!("wakepush.sweep.batch_size").record(batch_size);

        let mut sent = 0;
        for encoded in &due {
            if self.dispatch(encoded).await == DispatchOutcome::Sent {
                sent += 1;
            }
        }

        if !due.is_empty() {
            tracing::debug!(slot, popped = due.len(), sent, "Processed slot");
        }
        Ok(sent)
    }

    /// Resolves one popped destination and wakes its device.
    pub async fn dispatch(&self, encoded: &str) -> DispatchOutcome {
        let destination = match Destination::decode(encoded) {
            Ok(destination) => destination,
            Err(e) => {
                tracing::warn!(destination = %encoded, error = %e, "Skipping corrupt destination");
                counter!("wakepush.destinations.corrupt").increment(1);
                return DispatchOutcome::Corrupt;
            }
        };

        let Some((account, device)) = self.resolve(&destination).await else {
            tracing::debug!(destination = %encoded, "Dropping destination without account or device");
            counter!("wakepush.destinations.dropped").increment(1);
            return DispatchOutcome::Dropped;
        };

        let Some(device_token) = device.delivery_token.clone() else {
            tracing::debug!(destination = %encoded, "Dropping destination without delivery token");
            counter!("wakepush.destinations.dropped").increment(1);
            return DispatchOutcome::Dropped;
        };

        if self.is_stale(&device) {
            tracing::debug!(
                destination = %encoded,
                last_seen = device.last_seen_millis,
                "Evicting stale device"
            );
            counter!("wakepush.notifications.evicted").increment(1);
            return DispatchOutcome::Evicted;
        }

        let notification = PushNotification {
            device_token,
            destination: account,
            destination_device: device,
        };

        if let Err(e) = self.sender.send_notification(&notification).await {
            tracing::warn!(destination = %encoded, error = %e, "Failed to send wake-up notification");
            counter!("wakepush.notifications.failed").increment(1);
            return DispatchOutcome::Failed;
        }
        counter!("wakepush.notifications.sent").increment(1);

        let PushNotification {
            destination: account,
            destination_device: device,
            ..
        } = &notification;
        if let Err(e) = self
            .scheduler
            .reschedule_recurring_notification(account, device)
            .await
        {
            tracing::warn!(destination = %encoded, error = %e, "Failed to re-arm wake-up notification");
        }

        DispatchOutcome::Sent
    }

    async fn resolve(&self, destination: &Destination) -> Option<(Account, Device)> {
        let account = match Uuid::parse_str(&destination.account_id) {
            Ok(uuid) => self.directory.get_by_uuid(uuid).await,
            Err(_) => {
                self.directory
                    .get_by_primary_identifier(&destination.account_id)
                    .await
            }
        }?;
        let device = account.device(destination.device_id)?.clone();
        Some((account, device))
    }

    #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
    fn is_stale(&self, device: &Device) -> bool {
        let threshold: Duration = self.scheduler.config().stale_device_threshold;
        let cutoff = self
            .scheduler
            .now_millis()
            .saturating_sub(threshold.as_millis() as u64);
        device.last_seen_millis < cutoff
    }

    /// Maximum entries popped per slot visit.
    #[must_use]
    pub const fn batch_limit(&self) -> usize {
        self.batch_limit
    }
}

impl std::fmt::Debug for NotificationWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationWorker")
            .field("scheduler", &self.scheduler)
            .field("batch_limit", &self.batch_limit)
            .finish_non_exhaustive()
    }
}
