//! Test fixtures for scheduler integration tests.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use wakepush_scheduler::{
    Account, DeliveryError, Device, InMemoryScheduleStore, KeySpace, PushNotification, PushSender,
    Result, ScheduleStore, SchedulerError,
};

use super::NOW;

/// Builder for creating test accounts with one device.
pub struct AccountBuilder {
    uuid: Uuid,
    primary_identifier: String,
    device_id: u64,
    delivery_token: Option<String>,
    last_seen_millis: u64,
}

impl AccountBuilder {
    /// Creates a builder for an account with a random UUID.
    pub fn new() -> Self {
        Self {
            uuid: Uuid::new_v4(),
            primary_identifier: "+18005551234".to_owned(),
            device_id: 1,
            delivery_token: Some(format!("token-{}", Uuid::new_v4().simple())),
            last_seen_millis: NOW,
        }
    }

    /// Sets the primary identifier.
    pub fn with_primary_identifier(mut self, identifier: &str) -> Self {
        self.primary_identifier = identifier.to_owned();
        self
    }

    /// Sets the device id.
    pub fn with_device_id(mut self, id: u64) -> Self {
        self.device_id = id;
        self
    }

    /// Sets the delivery token.
    pub fn with_token(mut self, token: &str) -> Self {
        self.delivery_token = Some(token.to_owned());
        self
    }

    /// Removes the delivery token.
    pub fn without_token(mut self) -> Self {
        self.delivery_token = None;
        self
    }

    /// Sets when the device was last seen.
    pub fn last_seen(mut self, millis: u64) -> Self {
        self.last_seen_millis = millis;
        self
    }

    /// Builds the account and its device.
    pub fn build(self) -> (Account, Device) {
        let device = Device {
            id: self.device_id,
            delivery_token: self.delivery_token,
            last_seen_millis: self.last_seen_millis,
        };
        let account = Account {
            uuid: self.uuid,
            primary_identifier: self.primary_identifier,
            devices: vec![device.clone()],
        };
        (account, device)
    }
}

/// Push sender that records what it was asked to send.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<PushNotification>>,
    attempts: Mutex<usize>,
    failing_tokens: Mutex<HashSet<String>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every send to `token` fail.
    pub fn fail_for(&self, token: &str) {
        self.failing_tokens.lock().unwrap().insert(token.to_owned());
    }

    /// Notifications sent successfully, in order.
    pub fn sent(&self) -> Vec<PushNotification> {
        self.sent.lock().unwrap().clone()
    }

    /// Number of send attempts, including failures.
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl PushSender for RecordingSender {
    async fn send_notification(
        &self,
        notification: &PushNotification,
    ) -> std::result::Result<(), DeliveryError> {
        *self.attempts.lock().unwrap() += 1;
        if self
            .failing_tokens
            .lock()
            .unwrap()
            .contains(&notification.device_token)
        {
            return Err(DeliveryError::Rejected("BadDeviceToken".to_owned()));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Schedule store that delegates to an in-memory store until told to fail.
pub struct FlakyStore {
    inner: Arc<InMemoryScheduleStore>,
    fail_writes: AtomicBool,
    fail_pops: AtomicBool,
    cursor_failures: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<InMemoryScheduleStore>) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
            fail_pops: AtomicBool::new(false),
            cursor_failures: AtomicUsize::new(0),
        }
    }

    /// Makes upserts and removals fail until switched back.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes pops fail until switched back.
    pub fn fail_pops(&self, fail: bool) {
        self.fail_pops.store(fail, Ordering::SeqCst);
    }

    /// Makes the next `count` cursor operations fail.
    pub fn fail_next_cursor_ops(&self, count: usize) {
        self.cursor_failures.store(count, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }

    fn check_cursor(&self) -> Result<()> {
        let failing = self
            .cursor_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(unavailable());
        }
        Ok(())
    }
}

fn unavailable() -> SchedulerError {
    SchedulerError::Connection("store unavailable".to_owned())
}

#[async_trait]
impl ScheduleStore for FlakyStore {
    fn key_space(&self) -> KeySpace {
        self.inner.key_space()
    }

    async fn upsert_due(&self, slot: u16, destination: &str, due_millis: u64) -> Result<()> {
        Self::check(&self.fail_writes)?;
        self.inner.upsert_due(slot, destination, due_millis).await
    }

    async fn pop_due_before(
        &self,
        slot: u16,
        threshold_millis: u64,
        limit: usize,
    ) -> Result<Vec<String>> {
        Self::check(&self.fail_pops)?;
        self.inner.pop_due_before(slot, threshold_millis, limit).await
    }

    async fn remove_due(&self, slot: u16, destination: &str) -> Result<bool> {
        Self::check(&self.fail_writes)?;
        self.inner.remove_due(slot, destination).await
    }

    async fn due_time(&self, slot: u16, destination: &str) -> Result<Option<u64>> {
        self.inner.due_time(slot, destination).await
    }

    async fn get_cursor(&self) -> Result<u16> {
        self.check_cursor()?;
        self.inner.get_cursor().await
    }

    async fn set_cursor(&self, slot: u16) -> Result<()> {
        self.check_cursor()?;
        self.inner.set_cursor(slot).await
    }

    async fn advance_cursor(&self) -> Result<u16> {
        self.check_cursor()?;
        self.inner.advance_cursor().await
    }
}
