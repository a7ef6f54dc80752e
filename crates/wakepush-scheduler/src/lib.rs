//! Wakepush scheduler - recurring wake-up push notifications for mobile devices.
//!
//! Devices that must keep a real-time channel alive are woken periodically by a
//! push notification. The scheduler keeps track of who is due when, across a
//! fleet of processes sharing one Valkey cluster:
//!
//! - **Partitioning**: each device maps to one of 16384 slots, the same slots
//!   the cluster shards keys by
//! - **Scheduling**: each slot holds a sorted set of destinations keyed by due time
//! - **Sweeping**: workers visit one slot per tick, atomically pop what is due,
//!   wake the devices and re-arm them
//!
//! # Architecture
//!
//! ```text
//! schedule(account, device)
//!   └── endpoint key ── slot ── ZADD pending::{slot} destination due
//!
//! sweeper tick
//!   └── cursor ── pop due from slot (Lua) ── lookup ── send ── re-arm
//!         └── cursor = (slot + 1) mod N
//! ```
//!
//! Account storage and the push transport are supplied by the embedding
//! service through [`AccountDirectory`] and [`PushSender`].
//!
//! # Example
//!
//! ```ignore
//! use wakepush_scheduler::*;
//!
//! let config = WakeConfig::load()?;
//! let key_space = config.schedule.key_space()?;
//! let store = Arc::new(ValkeyScheduleStore::new(&config.valkey, key_space).await?);
//! let scheduler = Arc::new(NotificationScheduler::new(store, Arc::new(SystemClock), config.schedule.clone())?);
//! let worker = Arc::new(NotificationWorker::new(scheduler, directory, sender, config.sweep.batch_limit));
//! let handle = spawn_sweepers(worker, &config.sweep, CancellationToken::new());
//! ```

pub mod clock;
pub mod config;
pub mod delivery;
pub mod destination;
pub mod driver;
pub mod error;
pub mod identity;
pub mod scheduler;
pub mod slot;
pub mod store;
pub mod worker;

// Re-export main types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ScheduleConfig, SweepConfig, ValkeyConfig, WakeConfig};
pub use delivery::{PushNotification, PushSender};
pub use destination::{endpoint_key, Destination};
pub use driver::{spawn_sweepers, SweepHandle};
pub use error::{DeliveryError, DestinationParseError, Result, SchedulerError};
pub use identity::{Account, AccountDirectory, Device, DeviceId, InMemoryAccountDirectory};
pub use scheduler::NotificationScheduler;
pub use slot::{hash_slot, minimal_hash_tag, KeySpace, CLUSTER_SLOT_COUNT};
pub use store::{InMemoryScheduleStore, ScheduleStore, ValkeyScheduleStore};
pub use worker::{DispatchOutcome, NotificationWorker};
