//! Account and device lookup.
//!
//! The scheduler only needs to resolve a destination back to an account and a
//! device. How accounts are stored is up to the embedding service, which
//! provides an [`AccountDirectory`].

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Device identifier, unique within an account.
pub type DeviceId = u64;

/// A registered device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Device identifier.
    pub id: DeviceId,
    /// Push token used for wake-up notifications, if the device registered one.
    pub delivery_token: Option<String>,
    /// Last time the device connected, in milliseconds since the Unix epoch.
    pub last_seen_millis: u64,
}

/// An account and its devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Stable account identifier.
    pub uuid: Uuid,
    /// Primary (human-facing) identifier, e.g. a phone number.
    pub primary_identifier: String,
    /// Registered devices.
    pub devices: Vec<Device>,
}

impl Account {
    /// Looks up one of this account's devices.
    #[must_use]
    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }
}

/// Identity lookup used by the sweep worker.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Looks up an account by its primary identifier.
    async fn get_by_primary_identifier(&self, identifier: &str) -> Option<Account>;

    /// Looks up an account by its stable identifier.
    async fn get_by_uuid(&self, uuid: Uuid) -> Option<Account>;
}

/// In-memory account directory.
#[derive(Debug, Default)]
pub struct InMemoryAccountDirectory {
    accounts: DashMap<Uuid, Account>,
    primary_identifiers: DashMap<String, Uuid>,
}

impl InMemoryAccountDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an account.
    pub fn insert(&self, account: Account) {
        if let Some(previous) = self.accounts.get(&account.uuid) {
            self.primary_identifiers.remove(&previous.primary_identifier);
        }
        self.primary_identifiers
            .insert(account.primary_identifier.clone(), account.uuid);
        self.accounts.insert(account.uuid, account);
    }

    /// Removes an account.
    pub fn remove(&self, uuid: Uuid) -> Option<Account> {
        let (_, account) = self.accounts.remove(&uuid)?;
        self.primary_identifiers.remove(&account.primary_identifier);
        Some(account)
    }
}

#[async_trait]
impl AccountDirectory for InMemoryAccountDirectory {
    async fn get_by_primary_identifier(&self, identifier: &str) -> Option<Account> {
        let uuid = *self.primary_identifiers.get(identifier)?;
        self.accounts.get(&uuid).map(|a| a.clone())
    }

    async fn get_by_uuid(&self, uuid: Uuid) -> Option<Account> {
        self.accounts.get(&uuid).map(|a| a.clone())
    }
}
