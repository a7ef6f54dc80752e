//! Push delivery contract.

use async_trait::async_trait;

use crate::error::DeliveryError;
use crate::identity::{Account, Device};

/// A wake-up notification addressed to one device.
///
/// Built by the sweep worker and handed straight to the [`PushSender`]; never
/// stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushNotification {
    /// Push token of the destination device.
    pub device_token: String,
    /// Account the device belongs to.
    pub destination: Account,
    /// Device to wake.
    pub destination_device: Device,
}

/// Sends push notifications to the platform push service.
#[async_trait]
pub trait PushSender: Send + Sync {
    /// Sends one notification.
    async fn send_notification(&self, notification: &PushNotification)
        -> Result<(), DeliveryError>;
}
