//! Versioned cache of recipe cost bases.
//!
//! Every `(tenant, recipe)` key carries a monotonic watermark. A computation
//! reads the watermark before it starts and writes back with that version:
//!
//! - `put` is discarded unless its version is still the watermark
//! - `get` only returns an entry computed at the current watermark
//! - `invalidate` raises the watermark strictly and drops the entry
//!
//! Watermarks never move backwards, not even across purges or a clear, so a
//! computation that raced with an invalidation can never make the
//! pre-invalidation cost visible again.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::one::RefMut;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use uuid::Uuid;

use crate::error::PricingResult;
use crate::models::CostBasis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub tenant_id: Uuid,
    pub recipe_id: Uuid,
}

impl CacheKey {
    pub fn new(tenant_id: Uuid, recipe_id: Uuid) -> Self {
        Self {
            tenant_id,
            recipe_id,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tenant_id, self.recipe_id)
    }
}

/// A cached cost basis and the watermark it was computed at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedCost {
    pub basis: CostBasis,
    pub version: u64,
    pub computed_at: DateTime<Utc>,
}

impl CachedCost {
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now - self.computed_at < ttl,
            Err(_) => true,
        }
    }
}

/// Outcome of a `put`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Stored,
    /// The watermark moved past the computation's version
    Discarded,
}

/// Cache of recipe cost bases shared by all requests of the process (or cluster)
///
/// Freshness is decided by the caller from `computed_at`; the cache only
/// guarantees version consistency.
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Current watermark of the key (0 when never invalidated)
    async fn version(&self, key: &CacheKey) -> PricingResult<u64>;

    /// Entry computed at the current watermark, fresh or not
    async fn get(&self, key: &CacheKey) -> PricingResult<Option<CachedCost>>;

    async fn put(&self, key: &CacheKey, version: u64, basis: CostBasis)
    -> PricingResult<PutOutcome>;

    /// Raise the watermark to at least `version` (and strictly above the
    /// current one) and drop the entry. Returns the new watermark.
    async fn invalidate(&self, key: &CacheKey, version: u64) -> PricingResult<u64>;

    /// Drop keys untouched for longer than `retention` without lowering any
    /// watermark. Returns how many were removed.
    async fn purge_expired(&self, retention: Duration) -> PricingResult<usize>;

    /// Drop every entry and move every watermark forward, so computations
    /// already in flight cannot write back
    async fn clear(&self) -> PricingResult<()>;
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    watermark: u64,
    entry: Option<CachedCost>,
    touched_at: DateTime<Utc>,
}

impl Slot {
    fn empty(watermark: u64, now: DateTime<Utc>) -> Self {
        Self {
            watermark,
            entry: None,
            touched_at: now,
        }
    }
}

/// Process-local cache backed by a sharded concurrent map
///
/// Dropped slots leave their watermark behind in `floor`: a slot created
/// later starts there instead of at 0.
#[derive(Clone, Default)]
pub struct InMemoryResultCache {
    slots: Arc<DashMap<CacheKey, Slot>>,
    floor: Arc<AtomicU64>,
}

impl InMemoryResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &CacheKey, now: DateTime<Utc>) -> RefMut<'_, CacheKey, Slot> {
        self.slots
            .entry(*key)
            .or_insert_with(|| Slot::empty(self.floor.load(Ordering::SeqCst), now))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[async_trait]
impl ResultCache for InMemoryResultCache {
    async fn version(&self, key: &CacheKey) -> PricingResult<u64> {
        Ok(self
            .slots
            .get(key)
            .map(|s| s.watermark)
            .unwrap_or_else(|| self.floor.load(Ordering::SeqCst)))
    }

    async fn get(&self, key: &CacheKey) -> PricingResult<Option<CachedCost>> {
        Ok(self.slots.get(key).and_then(|slot| {
            slot.entry
                .filter(|entry| entry.version == slot.watermark)
        }))
    }

    async fn put(
        &self,
        key: &CacheKey,
        version: u64,
        basis: CostBasis,
    ) -> PricingResult<PutOutcome> {
        let now = Utc::now();
        let mut slot = self.slot(key, now);

        if version != slot.watermark {
            return Ok(PutOutcome::Discarded);
        }

        slot.entry = Some(CachedCost {
            basis,
            version,
            computed_at: now,
        });
        slot.touched_at = now;
        Ok(PutOutcome::Stored)
    }

    async fn invalidate(&self, key: &CacheKey, version: u64) -> PricingResult<u64> {
        let now = Utc::now();
        let mut slot = self.slot(key, now);

        slot.watermark = version.max(slot.watermark + 1);
        slot.entry = None;
        slot.touched_at = now;
        Ok(slot.watermark)
    }

    async fn purge_expired(&self, retention: Duration) -> PricingResult<usize> {
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            return Ok(0);
        };
        let cutoff = Utc::now() - retention;

        let mut purged = 0;
        self.slots.retain(|_, slot| {
            if slot.touched_at > cutoff {
                return true;
            }
            self.floor.fetch_max(slot.watermark, Ordering::SeqCst);
            purged += 1;
            false
        });
        Ok(purged)
    }

    async fn clear(&self) -> PricingResult<()> {
        let mut highest = self.floor.load(Ordering::SeqCst);
        self.slots.retain(|_, slot| {
            highest = highest.max(slot.watermark);
            false
        });
        self.floor.fetch_max(highest + 1, Ordering::SeqCst);
        Ok(())
    }
}

const KEY_PREFIX: &str = "pricing:cost";

/// KEYS[1] = watermark, KEYS[2] = entry; ARGV[1] = version, ARGV[2] = entry json,
/// ARGV[3] = retention seconds
const PUT_SCRIPT: &str = r"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if tonumber(ARGV[1]) ~= current then
  return 0
end
redis.call('SET', KEYS[2], ARGV[2], 'EX', ARGV[3])
return 1
";

/// KEYS[1] = watermark, KEYS[2] = entry; ARGV[1] = version
const INVALIDATE_SCRIPT: &str = r"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
local next = math.max(current + 1, tonumber(ARGV[1]))
redis.call('SET', KEYS[1], string.format('%d', next))
redis.call('DEL', KEYS[2])
return next
";

/// Cluster-visible cache in Redis
///
/// Compare-and-write runs server side in Lua. Both keys of a recipe share a
/// hash tag so they land in the same cluster slot. Entries expire after the
/// retention; watermarks never expire, one small key per invalidated recipe.
#[derive(Clone)]
pub struct RedisResultCache {
    conn: ConnectionManager,
    retention: Duration,
    put_script: Arc<redis::Script>,
    invalidate_script: Arc<redis::Script>,
}

impl RedisResultCache {
    /// `retention` is the Redis expiry applied to cost entries
    pub fn new(conn: ConnectionManager, retention: Duration) -> Self {
        Self {
            conn,
            retention,
            put_script: Arc::new(redis::Script::new(PUT_SCRIPT)),
            invalidate_script: Arc::new(redis::Script::new(INVALIDATE_SCRIPT)),
        }
    }

    fn watermark_key(key: &CacheKey) -> String {
        format!("{KEY_PREFIX}:{{{key}}}:ver")
    }

    fn entry_key(key: &CacheKey) -> String {
        format!("{KEY_PREFIX}:{{{key}}}:entry")
    }

    fn retention_secs(&self) -> u64 {
        self.retention.as_secs().max(1)
    }
}

#[async_trait]
impl ResultCache for RedisResultCache {
    async fn version(&self, key: &CacheKey) -> PricingResult<u64> {
        let mut conn = self.conn.clone();
        let version: Option<u64> = redis::cmd("GET")
            .arg(Self::watermark_key(key))
            .query_async(&mut conn)
            .await?;
        Ok(version.unwrap_or(0))
    }

    async fn get(&self, key: &CacheKey) -> PricingResult<Option<CachedCost>> {
        let mut conn = self.conn.clone();
        let (version, entry): (Option<u64>, Option<String>) = redis::cmd("MGET")
            .arg(Self::watermark_key(key))
            .arg(Self::entry_key(key))
            .query_async(&mut conn)
            .await?;

        let Some(raw) = entry else {
            return Ok(None);
        };

        let cached: CachedCost = serde_json::from_str(&raw)?;
        if cached.version != version.unwrap_or(0) {
            return Ok(None);
        }
        Ok(Some(cached))
    }

    async fn put(
        &self,
        key: &CacheKey,
        version: u64,
        basis: CostBasis,
    ) -> PricingResult<PutOutcome> {
        let entry = serde_json::to_string(&CachedCost {
            basis,
            version,
            computed_at: Utc::now(),
        })?;

        let mut conn = self.conn.clone();
        let stored: i64 = self
            .put_script
            .key(Self::watermark_key(key))
            .key(Self::entry_key(key))
            .arg(version)
            .arg(entry)
            .arg(self.retention_secs())
            .invoke_async(&mut conn)
            .await?;

        Ok(if stored == 1 {
            PutOutcome::Stored
        } else {
            PutOutcome::Discarded
        })
    }

    async fn invalidate(&self, key: &CacheKey, version: u64) -> PricingResult<u64> {
        let mut conn = self.conn.clone();
        let watermark: u64 = self
            .invalidate_script
            .key(Self::watermark_key(key))
            .key(Self::entry_key(key))
            .arg(version)
            .invoke_async(&mut conn)
            .await?;
        Ok(watermark)
    }

    async fn purge_expired(&self, _retention: Duration) -> PricingResult<usize> {
        // Entries carry their own expiry.
        Ok(0)
    }

    async fn clear(&self) -> PricingResult<()> {
        let mut conn = self.conn.clone();
        let pattern = format!("{KEY_PREFIX}:*");
        let mut cursor: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await?;

            // One command per key: keys of different recipes live in different slots.
            for key in keys {
                let command = if key.ends_with(":ver") { "INCR" } else { "DEL" };
                let _: i64 = redis::cmd(command).arg(key).query_async(&mut conn).await?;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(())
    }
}
