//! Key-space partitioning.
//!
//! Slots follow the Valkey/Redis Cluster key slot function, taken from the
//! client's cluster routing. Every process computes the same slot for the same
//! key, and a per-slot collection can be pinned to the cluster node that owns
//! that slot.

use std::sync::OnceLock;

use deadpool_redis::redis::cluster_routing::get_slot;

use crate::error::{Result, SchedulerError};

/// Number of hash slots in a Valkey/Redis cluster.
pub const CLUSTER_SLOT_COUNT: u16 = 16384;

const TAG_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

static MINIMAL_TAGS: OnceLock<Vec<String>> = OnceLock::new();

/// Cluster key slot for `key`, in `[0, 16384)`.
///
/// Only the hash tag is hashed when the key has a non-empty `{...}` section.
#[must_use]
pub fn hash_slot(key: &str) -> u16 {
    get_slot(key.as_bytes())
}

/// Shortest alphanumeric string whose cluster slot is `slot`.
///
/// Wrapped in braces, the tag pins any key to that slot. The table is built on
/// first use.
#[must_use]
pub fn minimal_hash_tag(slot: u16) -> &'static str {
    let tags = MINIMAL_TAGS.get_or_init(build_minimal_tags);
    tags.get(usize::from(slot % CLUSTER_SLOT_COUNT))
        .map_or("", String::as_str)
}

fn build_minimal_tags() -> Vec<String> {
    let mut tags: Vec<Option<String>> = vec![None; usize::from(CLUSTER_SLOT_COUNT)];
    let mut remaining = tags.len();
    let mut len = 1;

    while remaining > 0 {
        let mut digits = vec![0usize; len];
        loop {
            let candidate: Vec<u8> = digits.iter().map(|&d| TAG_ALPHABET[d]).collect();
            let slot = usize::from(get_slot(&candidate));
            if tags[slot].is_none() {
                tags[slot] = Some(String::from_utf8_lossy(&candidate).into_owned());
                remaining -= 1;
                if remaining == 0 {
                    break;
                }
            }
            if !advance(&mut digits) {
                break;
            }
        }
        len += 1;
    }

    tags.into_iter().map(Option::unwrap_or_default).collect()
}

/// Odometer increment over `TAG_ALPHABET`. Returns false on wrap-around.
fn advance(digits: &mut [usize]) -> bool {
    for digit in digits.iter_mut().rev() {
        if *digit + 1 < TAG_ALPHABET.len() {
            *digit += 1;
            return true;
        }
        *digit = 0;
    }
    false
}

/// A fixed key space of `slot_count` slots.
///
/// The cluster key space has 16384 slots, one per cluster hash slot. Smaller
/// key spaces fold cluster slots together and are only meaningful for
/// single-node stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySpace {
    slot_count: u16,
}

impl KeySpace {
    /// The Valkey/Redis Cluster key space.
    pub const CLUSTER: Self = Self {
        slot_count: CLUSTER_SLOT_COUNT,
    };

    /// Creates a key space of `slot_count` slots.
    pub fn new(slot_count: u16) -> Result<Self> {
        if slot_count == 0 || slot_count > CLUSTER_SLOT_COUNT {
            return Err(SchedulerError::Config(format!(
                "slot count must be in 1..={CLUSTER_SLOT_COUNT}, got {slot_count}"
            )));
        }
        Ok(Self { slot_count })
    }

    /// Number of slots.
    #[must_use]
    pub const fn slot_count(&self) -> u16 {
        self.slot_count
    }

    /// Slot that `key` belongs to.
    #[must_use]
    pub fn slot_of(&self, key: &str) -> u16 {
        hash_slot(key) % self.slot_count
    }

    /// Slot after `slot`, wrapping at the end of the key space.
    #[must_use]
    pub fn next(&self, slot: u16) -> u16 {
        (slot % self.slot_count + 1) % self.slot_count
    }

    /// Returns `slot` if it lies inside the key space.
    pub fn check(&self, slot: u16) -> Result<u16> {
        if slot < self.slot_count {
            Ok(slot)
        } else {
            Err(SchedulerError::InvalidSlot {
                slot,
                slot_count: self.slot_count,
            })
        }
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::CLUSTER
    }
}
