//! Token-bucket cooldowns and concurrency limits, keyed per bucket type.
//!
//! A command carries at most one cooldown mapping; each distinct bucket
//! key (user, guild, channel, member) gets its own window of `rate`
//! invocations per `per` seconds. A triggered bucket reports how long
//! until the window resets. `MaxConcurrency` uses the same bucket keys
//! to cap how many invocations may be in flight at once.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use herald_core::EntityId;

use crate::context::Context;
use crate::errors::CommandError;

/// Seconds since epoch, the clock the windows are measured against.
pub fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Buckets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketType {
    /// One shared bucket for everyone.
    Default,
    User,
    Guild,
    Channel,
    Member,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum BucketKey {
    Global,
    User(EntityId),
    Guild(EntityId),
    Channel(EntityId),
    Member(Option<EntityId>, EntityId),
}

impl BucketType {
    fn key(&self, ctx: &Context) -> BucketKey {
        match self {
            BucketType::Default => BucketKey::Global,
            BucketType::User => BucketKey::User(ctx.author.id),
            // Outside a guild, guild buckets degrade to per-user.
            BucketType::Guild => match ctx.guild_id {
                Some(guild) => BucketKey::Guild(guild),
                None => BucketKey::User(ctx.author.id),
            },
            BucketType::Channel => BucketKey::Channel(ctx.channel.id),
            BucketType::Member => BucketKey::Member(ctx.guild_id, ctx.author.id),
        }
    }
}

// ---------------------------------------------------------------------------
// Cooldown
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Cooldown {
    pub rate: u32,
    pub per: f64,
    window: f64,
    tokens: u32,
    last: f64,
}

impl Cooldown {
    pub fn new(rate: u32, per: f64) -> Self {
        Self { rate, per, window: 0.0, tokens: rate, last: 0.0 }
    }

    /// Tokens available at `current` before rate limiting applies.
    pub fn tokens_at(&self, current: f64) -> u32 {
        if current > self.window + self.per {
            self.rate
        } else {
            self.tokens
        }
    }

    /// Seconds until the window resets, zero if tokens remain.
    pub fn retry_after(&self, current: f64) -> f64 {
        if self.tokens_at(current) == 0 {
            self.per - (current - self.window)
        } else {
            0.0
        }
    }

    /// Spend one token. Returns the retry-after if the bucket is dry.
    pub fn update_rate_limit(&mut self, current: f64) -> Option<f64> {
        self.last = current;
        self.tokens = self.tokens_at(current);
        if self.tokens == self.rate {
            self.window = current;
        }
        if self.tokens == 0 {
            return Some(self.per - (current - self.window));
        }
        self.tokens -= 1;
        None
    }

    pub fn reset(&mut self) {
        self.tokens = self.rate;
        self.last = 0.0;
    }

    /// When the bucket last saw an invocation.
    pub fn last_invocation(&self) -> f64 {
        self.last
    }
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// Per-command cooldown state, shared across concurrent invocations.
#[derive(Debug)]
pub struct CooldownMapping {
    rate: u32,
    per: f64,
    bucket: BucketType,
    cache: Mutex<HashMap<BucketKey, Cooldown>>,
}

impl CooldownMapping {
    pub fn new(rate: u32, per: f64, bucket: BucketType) -> Self {
        Self { rate, per, bucket, cache: Mutex::new(HashMap::new()) }
    }

    pub fn bucket(&self) -> BucketType {
        self.bucket
    }

    /// Spend a token from the invocation's bucket.
    pub fn update_rate_limit(&self, ctx: &Context, current: f64) -> Option<f64> {
        let key = self.bucket.key(ctx);
        // A poisoned cache must not fail open.
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let cooldown = cache
            .entry(key.clone())
            .or_insert_with(|| Cooldown::new(self.rate, self.per));
        let retry = cooldown.update_rate_limit(current);
        if let Some(after) = retry {
            debug!("[Cooldown] bucket {key:?} dry, retry in {after:.2}s");
        }
        retry
    }
}

// ---------------------------------------------------------------------------
// Max concurrency
// ---------------------------------------------------------------------------

/// Cap on simultaneous in-flight invocations, one semaphore per bucket
/// key. A permit is held from after the checks until the after-invoke
/// hook has run.
#[derive(Debug)]
pub struct MaxConcurrency {
    number: u32,
    per: BucketType,
    buckets: Mutex<HashMap<BucketKey, Arc<Semaphore>>>,
}

impl MaxConcurrency {
    pub fn new(number: u32, per: BucketType) -> Self {
        Self { number, per, buckets: Mutex::new(HashMap::new()) }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn bucket(&self) -> BucketType {
        self.per
    }

    /// Claim a slot in the invocation's bucket, or fail immediately if
    /// all slots are taken.
    pub fn acquire(&self, ctx: &Context) -> Result<OwnedSemaphorePermit, CommandError> {
        let key = self.per.key(ctx);
        let semaphore = {
            let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(
                buckets
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(Semaphore::new(self.number as usize))),
            )
        };
        semaphore.try_acquire_owned().map_err(|_| {
            debug!("[Cooldown] concurrency bucket {key:?} full (limit {})", self.number);
            CommandError::MaxConcurrencyReached { limit: self.number }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{dm_context, test_context};

    #[test]
    fn bucket_depletes_and_reports_retry() {
        let mut cd = Cooldown::new(2, 10.0);
        assert_eq!(cd.update_rate_limit(100.0), None);
        assert_eq!(cd.update_rate_limit(101.0), None);
        let retry = cd.update_rate_limit(102.0).expect("dry bucket");
        assert!((retry - 8.0).abs() < 1e-9, "retry {retry}");
    }

    #[test]
    fn window_expiry_refills() {
        let mut cd = Cooldown::new(1, 5.0);
        assert_eq!(cd.update_rate_limit(100.0), None);
        assert!(cd.update_rate_limit(101.0).is_some());
        // Past the window, tokens are back.
        assert_eq!(cd.update_rate_limit(106.0), None);
    }

    #[test]
    fn retry_after_without_spending() {
        let mut cd = Cooldown::new(1, 5.0);
        cd.update_rate_limit(100.0);
        assert!((cd.retry_after(102.0) - 3.0).abs() < 1e-9);
        assert_eq!(cd.retry_after(106.0), 0.0);
    }

    #[test]
    fn concurrency_slot_frees_on_drop() {
        let limit = MaxConcurrency::new(1, BucketType::User);
        let ctx = test_context();
        let held = limit.acquire(&ctx).unwrap();
        assert_eq!(limit.acquire(&ctx).unwrap_err().kind(), "max_concurrency_reached");
        drop(held);
        assert!(limit.acquire(&ctx).is_ok());
    }

    #[test]
    fn concurrency_buckets_are_independent() {
        let limit = MaxConcurrency::new(1, BucketType::Guild);
        let guild_ctx = test_context();
        let dm_ctx = dm_context();
        let _held = limit.acquire(&guild_ctx).unwrap();
        // Degrades to a per-user key outside a guild, so it has its own
        // slot.
        assert!(limit.acquire(&dm_ctx).is_ok());
    }

    #[test]
    fn poisoned_cache_still_rate_limits() {
        let mapping = CooldownMapping::new(1, 60.0, BucketType::User);
        let ctx = test_context();
        assert_eq!(mapping.update_rate_limit(&ctx, 100.0), None);

        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = mapping.cache.lock().unwrap();
            panic!("poison the cache");
        }));
        assert!(mapping.update_rate_limit(&ctx, 101.0).is_some());
    }

    #[test]
    fn buckets_are_isolated_per_key() {
        let mapping = CooldownMapping::new(1, 60.0, BucketType::Guild);
        let guild_ctx = test_context();
        let dm_ctx = dm_context();
        assert_eq!(mapping.update_rate_limit(&guild_ctx, 100.0), None);
        // Same bucket, now dry.
        assert!(mapping.update_rate_limit(&guild_ctx, 101.0).is_some());
        // Different key (degrades to user), unaffected.
        assert_eq!(mapping.update_rate_limit(&dm_ctx, 101.0), None);
    }
}
