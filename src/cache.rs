// =============================================================================
// Cache — keyed TTL store with hit-ratio tracking
// =============================================================================
//
// Components ask the cache first and fall back to the upstream source on a
// miss, writing the fresh value back with its policy TTL (read-through).
// A cache failure never propagates to the caller — every method here is
// infallible; degrading to a direct source call is the caller's job, not
// this module's.
// =============================================================================

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

/// A single cached entry: the value plus its absolute expiry instant.
#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

/// Snapshot of cache health, suitable for the `/health` read API.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    /// Exponential moving average of the hit ratio, alpha = 0.1.
    pub hit_ratio_ema: f64,
}

/// Generic keyed TTL cache. Safe for concurrent use across tasks.
pub struct Cache {
    entries: RwLock<HashMap<String, Entry>>,
    hits: RwLock<u64>,
    misses: RwLock<u64>,
    hit_ratio_ema: RwLock<f64>,
}

const HIT_RATIO_ALPHA: f64 = 0.1;

impl Cache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            hits: RwLock::new(0),
            misses: RwLock::new(0),
            hit_ratio_ema: RwLock::new(0.0),
        }
    }

    /// Look up `key`. Returns `None` on miss or if the entry has expired
    /// (an expired entry is treated as absent, not actively purged here).
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let hit = {
            let entries = self.entries.read();
            entries
                .get(key)
                .filter(|e| e.expires_at > now)
                .map(|e| e.value.clone())
        };

        self.record_access(hit.is_some());
        hit
    }

    /// Typed convenience wrapper over [`get`](Self::get).
    pub fn get_typed<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| serde_json::from_value(v).ok())
    }

    /// Store `value` under `key` with the given TTL (seconds).
    pub fn set(&self, key: impl Into<String>, value: Value, ttl_seconds: u64) {
        let expires_at = Instant::now() + std::time::Duration::from_secs(ttl_seconds);
        self.entries
            .write()
            .insert(key.into(), Entry { value, expires_at });
    }

    /// Typed convenience wrapper over [`set`](Self::set).
    pub fn set_typed<T: Serialize>(&self, key: impl Into<String>, value: &T, ttl_seconds: u64) {
        if let Ok(v) = serde_json::to_value(value) {
            self.set(key, v, ttl_seconds);
        }
    }

    /// Atomically add `n` to a numeric counter stored at `key`, refreshing
    /// its TTL, and return the new value. Treats a missing/expired/non-
    /// numeric entry as starting from zero.
    pub fn increment(&self, key: &str, n: i64, ttl_seconds: u64) -> i64 {
        let mut entries = self.entries.write();
        let now = Instant::now();
        let current = entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .and_then(|e| e.value.as_i64())
            .unwrap_or(0);
        let updated = current + n;
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::from(updated),
                expires_at: now + std::time::Duration::from_secs(ttl_seconds),
            },
        );
        updated
    }

    fn record_access(&self, hit: bool) {
        if hit {
            *self.hits.write() += 1;
        } else {
            *self.misses.write() += 1;
        }
        let sample = if hit { 1.0 } else { 0.0 };
        let mut ema = self.hit_ratio_ema.write();
        *ema = (1.0 - HIT_RATIO_ALPHA) * *ema + HIT_RATIO_ALPHA * sample;
    }

    /// Drop all entries whose TTL has elapsed. Bounds memory growth for
    /// long-lived caches; callers are not required to call this for
    /// correctness (expired entries are already invisible to `get`).
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.read().len(),
            hits: *self.hits.read(),
            misses: *self.misses.read(),
            hit_ratio_ema: *self.hit_ratio_ema.read(),
        }
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Policy TTLs (seconds), per spec §4.2
// =============================================================================

pub mod ttl {
    pub const DISCOVERY: u64 = 120;
    pub const PAIR_SNAPSHOT: u64 = 30;
    pub const LAST_EMIT: u64 = 300;
    pub const SECURITY: u64 = 3600;
    pub const LEADERBOARD: u64 = 30;
    pub const SEARCH: u64 = 300;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn set_then_get_returns_value_within_ttl() {
        let cache = Cache::new();
        cache.set("k", Value::from(42), 60);
        assert_eq!(cache.get("k"), Some(Value::from(42)));
    }

    #[test]
    fn get_past_ttl_is_treated_as_absent() {
        let cache = Cache::new();
        cache.set("k", Value::from(1), 0);
        sleep(Duration::from_millis(5));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn subsequent_set_overwrites_prior_value() {
        let cache = Cache::new();
        cache.set("k", Value::from(1), 60);
        cache.set("k", Value::from(2), 60);
        assert_eq!(cache.get("k"), Some(Value::from(2)));
    }

    #[test]
    fn increment_accumulates_and_treats_missing_as_zero() {
        let cache = Cache::new();
        assert_eq!(cache.increment("c", 1, 60), 1);
        assert_eq!(cache.increment("c", 4, 60), 5);
    }

    #[test]
    fn increment_resets_after_ttl_elapses() {
        let cache = Cache::new();
        cache.increment("c", 10, 0);
        sleep(Duration::from_millis(5));
        assert_eq!(cache.increment("c", 1, 60), 1);
    }

    #[test]
    fn hit_ratio_ema_moves_toward_observed_rate() {
        let cache = Cache::new();
        cache.set("k", Value::from(1), 60);
        for _ in 0..20 {
            cache.get("k");
        }
        let stats = cache.stats();
        assert!(stats.hit_ratio_ema > 0.8, "ema={}", stats.hit_ratio_ema);
    }

    #[test]
    fn sweep_expired_removes_only_stale_entries() {
        let cache = Cache::new();
        cache.set("fresh", Value::from(1), 60);
        cache.set("stale", Value::from(2), 0);
        sleep(Duration::from_millis(5));
        let removed = cache.sweep_expired();
        assert_eq!(removed, 1);
        assert_eq!(cache.get("fresh"), Some(Value::from(1)));
    }

    #[test]
    fn typed_get_set_round_trips() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Foo {
            a: u32,
        }
        let cache = Cache::new();
        cache.set_typed("foo", &Foo { a: 7 }, 60);
        let out: Option<Foo> = cache.get_typed("foo");
        assert_eq!(out, Some(Foo { a: 7 }));
    }
}
