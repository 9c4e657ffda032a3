// =============================================================================
// Rate Limiter — per-source token bucket with jittered 429 back-off
// =============================================================================
//
// Each upstream source (dexscreener, geckoterminal, birdeye, goplus,
// honeypot, and each monitored exchange) gets its own token bucket:
// capacity = burst, refilled continuously at `rate` tokens/second based on
// wall-clock delta since the last refill.
//
// `can_make_request` is non-blocking: callers decide whether to skip or
// defer when the bucket is empty. `observe_429` zeroes the bucket and pushes
// `last_refill` into the future by a jittered back-off delay, so the next
// refill computation naturally withholds tokens until the back-off expires.
// =============================================================================

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, warn};

/// A single source's bucket configuration and mutable state.
struct Bucket {
    capacity: f64,
    /// Tokens refilled per second.
    rate_per_sec: f64,
    tokens: f64,
    last_refill: Instant,
    /// Consecutive-429 counter, reset on any successful acquire.
    attempt: u32,
}

impl Bucket {
    fn new(capacity: f64, rate_per_sec: f64) -> Self {
        Self {
            capacity,
            rate_per_sec,
            tokens: capacity,
            last_refill: Instant::now(),
            attempt: 0,
        }
    }

    fn refill(&mut self, now: Instant) {
        if now <= self.last_refill {
            return;
        }
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    fn try_consume(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            self.attempt = 0;
            true
        } else {
            false
        }
    }

    fn observe_429(&mut self, retry_after: Option<Duration>, now: Instant) {
        let delay = match retry_after {
            Some(d) => d,
            None => {
                let base_ms = 2u64.saturating_pow(self.attempt).saturating_mul(1000);
                let capped_ms = base_ms.min(30_000);
                let jitter_ms = rand::thread_rng().gen_range(0..250);
                Duration::from_millis(capped_ms + jitter_ms)
            }
        };
        self.attempt = self.attempt.saturating_add(1);
        self.tokens = 0.0;
        self.last_refill = now + delay;
    }
}

/// A named source's rate limit spec, used to seed default buckets.
#[derive(Debug, Clone, Copy)]
pub struct BucketSpec {
    pub burst: f64,
    pub rate_per_sec: f64,
}

impl BucketSpec {
    pub const fn rpm(burst: f64, rpm: f64) -> Self {
        Self {
            burst,
            rate_per_sec: rpm / 60.0,
        }
    }

    pub const fn rps(burst: f64, rps: f64) -> Self {
        Self {
            burst,
            rate_per_sec: rps,
        }
    }
}

/// Default bucket configuration for the radar's known upstream sources.
pub fn default_bucket_specs() -> HashMap<&'static str, BucketSpec> {
    let mut m = HashMap::new();
    m.insert("dexscreener", BucketSpec::rpm(10.0, 280.0));
    m.insert("geckoterminal", BucketSpec::rpm(5.0, 100.0));
    m.insert("birdeye", BucketSpec::rps(3.0, 0.9));
    m.insert("goplus", BucketSpec::rpm(3.0, 25.0));
    m.insert("honeypot", BucketSpec::rps(2.0, 1.0));
    m
}

/// Thread-safe per-source token bucket rate limiter.
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
    specs: HashMap<String, BucketSpec>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_specs(
            default_bucket_specs()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    pub fn with_specs(specs: HashMap<String, BucketSpec>) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            specs,
        }
    }

    /// Register (or override) a bucket spec for `source`, used for exchange
    /// sources configured outside the built-in defaults.
    pub fn register(&mut self, source: impl Into<String>, spec: BucketSpec) {
        self.specs.insert(source.into(), spec);
    }

    fn spec_for(&self, source: &str) -> BucketSpec {
        self.specs
            .get(source)
            .copied()
            .unwrap_or(BucketSpec::rpm(5.0, 60.0))
    }

    /// Attempt to acquire one token for `source`. Non-blocking — returns
    /// `false` immediately if no token is available.
    pub fn can_make_request(&self, source: &str) -> bool {
        let now = Instant::now();
        let spec = self.spec_for(source);
        let mut buckets = self.buckets.lock();
        let bucket = buckets
            .entry(source.to_string())
            .or_insert_with(|| Bucket::new(spec.burst, spec.rate_per_sec));
        let ok = bucket.try_consume(now);
        if !ok {
            debug!(source, "rate limiter: no token available");
        }
        ok
    }

    /// Record a 429 response from `source`, zeroing its bucket and pushing
    /// the next refill out by `retry_after` (if provided by the upstream)
    /// or a jittered exponential back-off otherwise.
    pub fn observe_429(&self, source: &str, retry_after: Option<Duration>) {
        let now = Instant::now();
        let spec = self.spec_for(source);
        let mut buckets = self.buckets.lock();
        let bucket = buckets
            .entry(source.to_string())
            .or_insert_with(|| Bucket::new(spec.burst, spec.rate_per_sec));
        bucket.observe_429(retry_after, now);
        warn!(source, retry_after = ?retry_after, "rate limiter: 429 observed, backing off");
    }

    /// Snapshot of tokens currently available per known source, for the
    /// `GET /health` read API's `rateLimits` field. Does not refill buckets
    /// that have not been touched since the last access.
    pub fn snapshot(&self) -> HashMap<String, f64> {
        self.buckets
            .lock()
            .iter()
            .map(|(source, bucket)| (source.clone(), bucket.tokens))
            .collect()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_tokens_are_available_immediately() {
        let mut specs = HashMap::new();
        specs.insert("x".to_string(), BucketSpec::rps(3.0, 1.0));
        let rl = RateLimiter::with_specs(specs);
        assert!(rl.can_make_request("x"));
        assert!(rl.can_make_request("x"));
        assert!(rl.can_make_request("x"));
        assert!(!rl.can_make_request("x"));
    }

    #[test]
    fn bucket_refills_over_time() {
        let mut specs = HashMap::new();
        specs.insert("y".to_string(), BucketSpec::rps(1.0, 100.0));
        let rl = RateLimiter::with_specs(specs);
        assert!(rl.can_make_request("y"));
        assert!(!rl.can_make_request("y"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(rl.can_make_request("y"));
    }

    #[test]
    fn observe_429_blocks_until_retry_after_elapses() {
        let mut specs = HashMap::new();
        specs.insert("z".to_string(), BucketSpec::rps(5.0, 1000.0));
        let rl = RateLimiter::with_specs(specs);
        assert!(rl.can_make_request("z"));
        rl.observe_429("z", Some(Duration::from_millis(30)));
        assert!(!rl.can_make_request("z"));
        std::thread::sleep(Duration::from_millis(40));
        assert!(rl.can_make_request("z"));
    }

    #[test]
    fn distinct_sources_have_independent_buckets() {
        let rl = RateLimiter::new();
        rl.observe_429("dexscreener", Some(Duration::from_secs(5)));
        assert!(!rl.can_make_request("dexscreener"));
        assert!(rl.can_make_request("honeypot"));
    }

    #[test]
    fn snapshot_reports_tokens_for_touched_sources() {
        let rl = RateLimiter::new();
        assert!(rl.can_make_request("dexscreener"));
        let snap = rl.snapshot();
        assert!(snap.contains_key("dexscreener"));
        assert!(!snap.contains_key("geckoterminal"));
    }

    #[test]
    fn successful_acquire_resets_attempt_counter() {
        let mut specs = HashMap::new();
        specs.insert("w".to_string(), BucketSpec::rps(1.0, 1000.0));
        let rl = RateLimiter::with_specs(specs);
        rl.observe_429("w", None);
        std::thread::sleep(Duration::from_millis(1100));
        assert!(rl.can_make_request("w"));
        // A second 429 right after a fresh success should back off from
        // attempt=0 again (short delay), not compound further.
        rl.observe_429("w", None);
        std::thread::sleep(Duration::from_millis(1100));
        assert!(rl.can_make_request("w"));
    }
}
