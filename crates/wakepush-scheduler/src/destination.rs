//! Destination identifiers and endpoint keys.

use std::fmt;
use std::str::FromStr;

use crate::error::DestinationParseError;
use crate::identity::{Account, Device, DeviceId};

/// Separator between the account and device segments of a destination.
pub const SEPARATOR: char = ':';

const ENDPOINT_KEY_PREFIX: &str = "wake_device::";

/// An (account, device) pair as stored in a slot's due set.
///
/// Encoded as `<account>:<device>`. The account segment is normally the
/// account's UUID; entries written with a primary identifier instead still
/// decode and are resolved through that identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    /// Account segment.
    pub account_id: String,
    /// Device segment.
    pub device_id: DeviceId,
}

impl Destination {
    /// Creates a destination from its parts.
    pub fn new(account_id: impl Into<String>, device_id: DeviceId) -> Self {
        Self {
            account_id: account_id.into(),
            device_id,
        }
    }

    /// Destination for a device of an account, keyed by the account's UUID.
    #[must_use]
    pub fn for_device(account: &Account, device: &Device) -> Self {
        Self::new(account.uuid.to_string(), device.id)
    }

    /// Encoded form.
    #[must_use]
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Parses an encoded destination.
    pub fn decode(encoded: &str) -> Result<Self, DestinationParseError> {
        encoded.parse()
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.account_id, self.device_id)
    }
}

impl FromStr for Destination {
    type Err = DestinationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(SEPARATOR);
        let account = parts.next().unwrap_or_default();
        let Some(device) = parts.next() else {
            return Err(DestinationParseError::MissingSeparator(s.to_owned()));
        };
        if parts.next().is_some() {
            return Err(DestinationParseError::TooManySeparators(s.to_owned()));
        }
        if account.is_empty() {
            return Err(DestinationParseError::EmptyAccount(s.to_owned()));
        }
        if device.is_empty() || !device.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DestinationParseError::InvalidDeviceId(s.to_owned()));
        }
        let device_id = device
            .parse()
            .map_err(|_| DestinationParseError::InvalidDeviceId(s.to_owned()))?;

        Ok(Self::new(account, device_id))
    }
}

/// Partitioning key for a device.
///
/// The UUID and device id form a hash tag, so the key's slot depends only on
/// the pair and never changes for the lifetime of the device.
#[must_use]
pub fn endpoint_key(account: &Account, device: &Device) -> String {
    format!("{ENDPOINT_KEY_PREFIX}{{{}::{}}}", account.uuid, device.id)
}
