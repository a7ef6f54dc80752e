//! Error types for the scheduler.

use thiserror::Error;

/// Scheduler errors.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Valkey/Redis pool error.
    #[error("valkey error: {0}")]
    Valkey(#[from] deadpool_redis::PoolError),

    /// Redis command error.
    #[error("redis error: {0}")]
    Redis(#[from] deadpool_redis::redis::RedisError),

    /// Could not obtain a store connection.
    #[error("connection error: {0}")]
    Connection(String),

    /// Slot index outside the key space.
    #[error("slot {slot} is outside the key space of {slot_count} slots")]
    InvalidSlot {
        /// The rejected slot.
        slot: u16,
        /// Number of slots in the key space.
        slot_count: u16,
    },
}

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Errors decoding a destination identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DestinationParseError {
    /// No separator between account and device.
    #[error("destination has no separator: {0}")]
    MissingSeparator(String),

    /// More than one separator.
    #[error("destination has more than one separator: {0}")]
    TooManySeparators(String),

    /// Account segment is empty.
    #[error("destination has an empty account segment: {0}")]
    EmptyAccount(String),

    /// Device segment is not a non-negative integer.
    #[error("invalid device id in destination: {0}")]
    InvalidDeviceId(String),
}

/// Push delivery errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The push service refused the notification.
    #[error("notification rejected: {0}")]
    Rejected(String),

    /// The push service could not be reached.
    #[error("push service unavailable: {0}")]
    Unavailable(String),
}
