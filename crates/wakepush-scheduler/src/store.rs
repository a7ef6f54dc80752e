//! Schedule store: per-slot due sets and the sweep cursor.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU16, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use deadpool_redis::redis::aio::ConnectionLike;
use deadpool_redis::redis::{self, AsyncCommands, Cmd, Pipeline, RedisFuture, Script, Value};
use deadpool_redis::{cluster, Config, Pool, PoolConfig, Runtime};

use crate::config::ValkeyConfig;
use crate::error::{Result, SchedulerError};
use crate::slot::{minimal_hash_tag, KeySpace};

/// Pops up to ARGV[2] members scored at or below ARGV[1], lowest first.
const POP_DUE_SCRIPT: &str = r"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, tonumber(ARGV[2]))
if #due > 0 then
  redis.call('ZREMRANGEBYRANK', KEYS[1], 0, #due - 1)
end
return due
";

/// Returns the raw cursor and stores the slot after it, modulo ARGV[1].
/// A missing or invalid cursor counts as slot 0.
const ADVANCE_CURSOR_SCRIPT: &str = r"
local raw = redis.call('GET', KEYS[1])
local slot_count = tonumber(ARGV[1])
local current = 0
if raw and string.match(raw, '^%d+$') then
  local value = tonumber(raw)
  if value < slot_count then
    current = value
  end
end
redis.call('SET', KEYS[1], (current + 1) % slot_count)
return raw
";

/// Trait for schedule storage backends.
///
/// Every operation on a slot's due set is atomic with respect to other callers
/// on the same slot, including callers in other processes.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Key space the store is partitioned by.
    fn key_space(&self) -> KeySpace;

    /// Inserts `destination` into `slot`, or moves it to `due_millis` if present.
    async fn upsert_due(&self, slot: u16, destination: &str, due_millis: u64) -> Result<()>;

    /// Removes and returns up to `limit` destinations due at or before
    /// `threshold_millis`, earliest first.
    async fn pop_due_before(
        &self,
        slot: u16,
        threshold_millis: u64,
        limit: usize,
    ) -> Result<Vec<String>>;

    /// Removes `destination` from `slot`. Returns whether it was present.
    async fn remove_due(&self, slot: u16, destination: &str) -> Result<bool>;

    /// Due time of `destination` in `slot`, if scheduled.
    async fn due_time(&self, slot: u16, destination: &str) -> Result<Option<u64>>;

    /// Next slot to sweep. Zero until first set.
    async fn get_cursor(&self) -> Result<u16>;

    /// Stores the next slot to sweep.
    async fn set_cursor(&self, slot: u16) -> Result<()>;

    /// Claims the slot under the cursor and moves the cursor past it, in one
    /// atomic step. Concurrent callers claim consecutive slots.
    async fn advance_cursor(&self) -> Result<u16>;
}

/// Parses a persisted cursor. Anything that is not a slot of the cluster key
/// space is logged and read as slot 0.
fn parse_cursor(value: &str) -> u16 {
    let slot = if value.bytes().all(|b| b.is_ascii_digit()) {
        value.parse::<u16>().ok().and_then(|s| KeySpace::CLUSTER.check(s).ok())
    } else {
        None
    };
    slot.unwrap_or_else(|| {
        tracing::warn!(value = %value, "Ignoring invalid sweep cursor");
        0
    })
}

enum ValkeyPool {
    Standalone(Pool),
    Cluster(cluster::Pool),
}

enum ValkeyConnection {
    Standalone(deadpool_redis::Connection),
    Cluster(cluster::Connection),
}

impl ConnectionLike for ValkeyConnection {
    fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
        match self {
            Self::Standalone(conn) => conn.req_packed_command(cmd),
            Self::Cluster(conn) => conn.req_packed_command(cmd),
        }
    }

    fn req_packed_commands<'a>(
        &'a mut self,
        cmd: &'a Pipeline,
        offset: usize,
        count: usize,
    ) -> RedisFuture<'a, Vec<Value>> {
        match self {
            Self::Standalone(conn) => conn.req_packed_commands(cmd, offset, count),
            Self::Cluster(conn) => conn.req_packed_commands(cmd, offset, count),
        }
    }

    fn get_db(&self) -> i64 {
        match self {
            Self::Standalone(conn) => conn.get_db(),
            Self::Cluster(conn) => conn.get_db(),
        }
    }
}

/// Valkey-backed schedule store.
///
/// Each slot's due set is a sorted set scored by due time, keyed with the
/// slot's minimal hash tag so it lives on the node that owns the slot. The
/// cursor is a plain string key.
pub struct ValkeyScheduleStore {
    pool: ValkeyPool,
    key_prefix: String,
    pop_script: Script,
    advance_script: Script,
}

impl ValkeyScheduleStore {
    /// Creates a new Valkey schedule store.
    ///
    /// Connects in cluster mode when `cluster_urls` is non-empty. The key space
    /// must be the cluster key space.
    pub async fn new(config: &ValkeyConfig, key_space: KeySpace) -> Result<Self> {
        if key_space != KeySpace::CLUSTER {
            return Err(SchedulerError::Config(format!(
                "valkey store requires {} slots, got {}",
                KeySpace::CLUSTER.slot_count(),
                key_space.slot_count()
            )));
        }

        let pool_config = PoolConfig::new(config.max_connections);
        let pool = if config.cluster_urls.is_empty() {
            let mut cfg = Config::from_url(&config.url);
            cfg.pool = Some(pool_config);
            ValkeyPool::Standalone(
                cfg.create_pool(Some(Runtime::Tokio1))
                    .map_err(|e| SchedulerError::Config(e.to_string()))?,
            )
        } else {
            let mut cfg = cluster::Config::from_urls(config.cluster_urls.clone());
            cfg.pool = Some(pool_config);
            ValkeyPool::Cluster(
                cfg.create_pool(Some(Runtime::Tokio1))
                    .map_err(|e| SchedulerError::Config(e.to_string()))?,
            )
        };

        let store = Self {
            pool,
            key_prefix: config.key_prefix.clone(),
            pop_script: Script::new(POP_DUE_SCRIPT),
            advance_script: Script::new(ADVANCE_CURSOR_SCRIPT),
        };

        // Test connection
        let mut conn = store.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        Ok(store)
    }

    async fn connection(&self) -> Result<ValkeyConnection> {
        match &self.pool {
            ValkeyPool::Standalone(pool) => Ok(ValkeyConnection::Standalone(pool.get().await?)),
            ValkeyPool::Cluster(pool) => pool
                .get()
                .await
                .map(ValkeyConnection::Cluster)
                .map_err(|e| SchedulerError::Connection(e.to_string())),
        }
    }

    fn queue_key(&self, slot: u16) -> String {
        format!("{}::pending::{{{}}}", self.key_prefix, minimal_hash_tag(slot))
    }

    fn cursor_key(&self) -> String {
        format!("{}::next_slot", self.key_prefix)
    }
}

#[async_trait]
impl ScheduleStore for ValkeyScheduleStore {
    fn key_space(&self) -> KeySpace {
        KeySpace::CLUSTER
    }

    async fn upsert_due(&self, slot: u16, destination: &str, due_millis: u64) -> Result<()> {
        let slot = KeySpace::CLUSTER.check(slot)?;
        let mut conn = self.connection().await?;
        let _: i64 = conn
            .zadd(self.queue_key(slot), destination, due_millis)
            .await?;
        Ok(())
    }

    async fn pop_due_before(
        &self,
        slot: u16,
        threshold_millis: u64,
        limit: usize,
    ) -> Result<Vec<String>> {
        let slot = KeySpace::CLUSTER.check(slot)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.connection().await?;
        let due: Vec<String> = self
            .pop_script
            .key(self.queue_key(slot))
            .arg(threshold_millis)
            .arg(limit)
            .invoke_async(&mut conn)
            .await?;
        Ok(due)
    }

    async fn remove_due(&self, slot: u16, destination: &str) -> Result<bool> {
        let slot = KeySpace::CLUSTER.check(slot)?;
        let mut conn = self.connection().await?;
        let removed: i64 = conn.zrem(self.queue_key(slot), destination).await?;
        Ok(removed > 0)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
    async fn due_time(&self, slot: u16, destination: &str) -> Result<Option<u64>> {
        let slot = KeySpace::CLUSTER.check(slot)?;
        let mut conn = self.connection().await?;
        let score: Option<f64> = conn.zscore(self.queue_key(slot), destination).await?;
        Ok(score.map(|s| s as u64))
    }

    async fn get_cursor(&self) -> Result<u16> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(self.cursor_key()).await?;

        Ok(value.as_deref().map_or(0, parse_cursor))
    }

    async fn set_cursor(&self, slot: u16) -> Result<()> {
        let slot = KeySpace::CLUSTER.check(slot)?;
        let mut conn = self.connection().await?;
        conn.set::<_, _, ()>(self.cursor_key(), slot).await?;
        Ok(())
    }

    async fn advance_cursor(&self) -> Result<u16> {
        let mut conn = self.connection().await?;
        let previous: Option<String> = self
            .advance_script
            .key(self.cursor_key())
            .arg(KeySpace::CLUSTER.slot_count())
            .invoke_async(&mut conn)
            .await?;
        Ok(previous.as_deref().map_or(0, parse_cursor))
    }
}

impl std::fmt::Debug for ValkeyScheduleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self.pool {
            ValkeyPool::Standalone(_) => "standalone",
            ValkeyPool::Cluster(_) => "cluster",
        };
        f.debug_struct("ValkeyScheduleStore")
            .field("mode", &mode)
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

/// One slot's due set.
#[derive(Debug, Default)]
struct SlotQueue {
    due: HashMap<String, u64>,
    ordered: BTreeSet<(u64, String)>,
}

impl SlotQueue {
    fn upsert(&mut self, destination: &str, due_millis: u64) {
        if let Some(previous) = self.due.insert(destination.to_owned(), due_millis) {
            self.ordered.remove(&(previous, destination.to_owned()));
        }
        self.ordered.insert((due_millis, destination.to_owned()));
    }

    fn pop_due(&mut self, threshold_millis: u64, limit: usize) -> Vec<String> {
        let mut popped = Vec::new();
        while popped.len() < limit {
            match self.ordered.first() {
                Some((due, _)) if *due <= threshold_millis => {}
                _ => break,
            }
            if let Some((_, destination)) = self.ordered.pop_first() {
                self.due.remove(&destination);
                popped.push(destination);
            }
        }
        popped
    }

    fn remove(&mut self, destination: &str) -> bool {
        match self.due.remove(destination) {
            Some(due) => self.ordered.remove(&(due, destination.to_owned())),
            None => false,
        }
    }
}

/// In-memory schedule store for testing and single-process use.
#[derive(Debug)]
pub struct InMemoryScheduleStore {
    key_space: KeySpace,
    slots: DashMap<u16, SlotQueue>,
    cursor: AtomicU16,
}

impl InMemoryScheduleStore {
    /// Creates an empty store over `key_space`.
    #[must_use]
    pub fn new(key_space: KeySpace) -> Self {
        Self {
            key_space,
            slots: DashMap::new(),
            cursor: AtomicU16::new(0),
        }
    }

    /// Number of entries in `slot`, due or not.
    #[must_use]
    pub fn slot_len(&self, slot: u16) -> usize {
        self.slots.get(&slot).map_or(0, |q| q.due.len())
    }
}

impl Default for InMemoryScheduleStore {
    fn default() -> Self {
        Self::new(KeySpace::default())
    }
}

#[async_trait]
impl ScheduleStore for InMemoryScheduleStore {
    fn key_space(&self) -> KeySpace {
        self.key_space
    }

    async fn upsert_due(&self, slot: u16, destination: &str, due_millis: u64) -> Result<()> {
        let slot = self.key_space.check(slot)?;
        self.slots
            .entry(slot)
            .or_default()
            .upsert(destination, due_millis);
        Ok(())
    }

    async fn pop_due_before(
        &self,
        slot: u16,
        threshold_millis: u64,
        limit: usize,
    ) -> Result<Vec<String>> {
        let slot = self.key_space.check(slot)?;
        Ok(self
            .slots
            .get_mut(&slot)
            .map(|mut q| q.pop_due(threshold_millis, limit))
            .unwrap_or_default())
    }

    async fn remove_due(&self, slot: u16, destination: &str) -> Result<bool> {
        let slot = self.key_space.check(slot)?;
        Ok(self
            .slots
            .get_mut(&slot)
            .is_some_and(|mut q| q.remove(destination)))
    }

    async fn due_time(&self, slot: u16, destination: &str) -> Result<Option<u64>> {
        let slot = self.key_space.check(slot)?;
        Ok(self
            .slots
            .get(&slot)
            .and_then(|q| q.due.get(destination).copied()))
    }

    async fn get_cursor(&self) -> Result<u16> {
        Ok(self.cursor.load(Ordering::SeqCst))
    }

    async fn set_cursor(&self, slot: u16) -> Result<()> {
        let slot = self.key_space.check(slot)?;
        self.cursor.store(slot, Ordering::SeqCst);
        Ok(())
    }

    async fn advance_cursor(&self) -> Result<u16> {
        let key_space = self.key_space;
        let previous = self
            .cursor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |slot| {
                Some(key_space.next(slot))
            })
            .unwrap_or_else(|slot| slot);
        Ok(previous)
    }
}
