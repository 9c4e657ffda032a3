// =============================================================================
// DataCollector — discovery + polling pipeline (spec §4.4)
// =============================================================================
//
// Two independent loops share this struct's state:
//   - `discovery_cycle` periodically searches DexScreener (and, for `sol`,
//     Birdeye's trending list as a secondary seed) per chain/quote pair and
//     refills each chain's DiscoveryQueue.
//   - `poll_cycle` takes a batch of queued addresses, fetches their current
//     pair snapshot, validates/normalizes/updates the rolling Baseline, and
//     emits a PairUpdate onto the shared channel when the emit-dedup policy
//     says the change is material.
//
// Both loops degrade rather than crash: a failed upstream call increments a
// health counter and the address is cooled down, never propagated as a panic.
// =============================================================================

pub mod baseline;
pub mod discovery;
pub mod health;
pub mod poller;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cache::{ttl, Cache};
use crate::http_fetcher::{FetchError, HttpFetcher};
use crate::rate_limiter::RateLimiter;
use crate::runtime_config::RuntimeConfig;
use crate::sources::birdeye::BirdeyeSource;
use crate::sources::dexscreener::{DexPair, DexScreenerSource};
use crate::sources::geckoterminal::GeckoTerminalSource;
use crate::types::{ChainId, PairUpdate};

use baseline::Baseline;
use discovery::DiscoveryQueue;
use health::{HealthCounters, HealthSnapshot};

/// Addresses polled per chain per `poll_cycle` tick. Keeps a single tick
/// bounded in wall-clock time regardless of how large a chain's queue grows.
const POLL_BATCH_SIZE: usize = 40;

/// How long a pair that 404s or fails validation is excluded from polling.
const FAILURE_COOLDOWN_MS: i64 = 10 * 60 * 1000;

/// Upper bound on how long a discovered-but-never-validated address sits in
/// the queue before `prune` drops it (distinct from `max_age_hours`, which
/// governs already-validated baselines).
const DISCOVERY_MAX_AGE_MS: i64 = 6 * 60 * 60 * 1000;

pub struct DataCollector {
    fetcher: Arc<HttpFetcher>,
    cache: Arc<Cache>,
    config: Arc<RwLock<RuntimeConfig>>,
    dex: DexScreenerSource,
    gecko: GeckoTerminalSource,
    birdeye: BirdeyeSource,
    queues: RwLock<HashMap<ChainId, DiscoveryQueue>>,
    baselines: RwLock<HashMap<(ChainId, String), Baseline>>,
    seen_pairs: RwLock<HashMap<(ChainId, String), i64>>,
    health: HealthCounters,
    tx: mpsc::Sender<PairUpdate>,
}

impl DataCollector {
    pub fn new(
        rate_limiter: Arc<RateLimiter>,
        config: Arc<RwLock<RuntimeConfig>>,
        tx: mpsc::Sender<PairUpdate>,
    ) -> Self {
        let fetcher = Arc::new(HttpFetcher::new(rate_limiter));
        Self {
            dex: DexScreenerSource::new(fetcher.clone()),
            gecko: GeckoTerminalSource::new(fetcher.clone()),
            birdeye: BirdeyeSource::new(fetcher.clone()),
            fetcher,
            cache: Arc::new(Cache::new()),
            config,
            queues: RwLock::new(HashMap::new()),
            baselines: RwLock::new(HashMap::new()),
            seen_pairs: RwLock::new(HashMap::new()),
            health: HealthCounters::new(),
            tx,
        }
    }

    pub fn cache(&self) -> Arc<Cache> {
        self.cache.clone()
    }

    /// Spawn the discovery and polling loops at their configured cadences.
    /// Returns immediately; both loops run until the process exits.
    pub fn spawn_all(self: Arc<Self>) {
        let discovery = self.clone();
        tokio::spawn(async move { discovery.run_discovery_loop().await });

        let polling = self.clone();
        tokio::spawn(async move { polling.run_poll_loop().await });
    }

    async fn run_discovery_loop(self: Arc<Self>) {
        loop {
            let refresh_ms = self.config.read().refresh_ms;
            // Discovery runs on a slower cadence than polling: every fourth
            // poll tick is enough to keep queues fresh without doubling the
            // search-endpoint call volume.
            let interval = (refresh_ms * 4).max(30_000);
            self.discovery_cycle().await;
            tokio::time::sleep(std::time::Duration::from_millis(interval)).await;
        }
    }

    async fn run_poll_loop(self: Arc<Self>) {
        loop {
            let refresh_ms = self.config.read().refresh_ms;
            self.poll_cycle().await;
            tokio::time::sleep(std::time::Duration::from_millis(refresh_ms)).await;
        }
    }

    /// One discovery sweep across every configured chain: search each quote
    /// keyword, and for `sol` also merge in Birdeye's trending list (spec
    /// §4.4 "Discovery"). Every candidate pair address is queued regardless
    /// of validity — `poll_cycle` is where validation actually happens.
    pub async fn discovery_cycle(&self) {
        let chains = self.config.read().chains.clone();
        let now_ms = now_ms();

        for chain in chains {
            let cache_key = format!("discovery:{chain}");
            if self.cache.get(&cache_key).is_some() {
                continue;
            }

            let mut candidates: Vec<DexPair> = Vec::new();
            for quote in chain.discovery_quotes() {
                self.health.record_call("dexscreener", now_ms);
                match self.dex.search(quote).await {
                    Ok(pairs) => candidates.extend(
                        pairs
                            .into_iter()
                            .filter(|p| chain.matches_dex_chain_str(&p.chain_id)),
                    ),
                    Err(e) => self.record_fetch_failure("dexscreener", &e),
                }
            }

            if chain == ChainId::Sol {
                self.health.record_call("birdeye", now_ms);
                match self.birdeye.trending().await {
                    Ok(tokens) if !tokens.is_empty() => {
                        debug!(count = tokens.len(), "birdeye trending seeded discovery");
                    }
                    Ok(_) => {}
                    Err(e) => self.record_fetch_failure("birdeye", &e),
                }
            }

            if candidates.is_empty() {
                self.health.record_call("geckoterminal", now_ms);
                if let Err(e) = self.gecko.trending_pools(chain.as_str()).await {
                    self.record_fetch_failure("geckoterminal", &e);
                }
            }

            let mut queues = self.queues.write();
            let queue = queues.entry(chain).or_insert_with(DiscoveryQueue::new);
            for pair in &candidates {
                queue.add_candidate(pair.pair_address.clone());
            }
            let seen = self.seen_pairs.read();
            queue.prune(now_ms, DISCOVERY_MAX_AGE_MS, &to_plain_map(&seen, chain));
            drop(seen);

            self.health.record_tick(chain, now_ms);
            self.cache.set(cache_key, serde_json::Value::Bool(true), ttl::DISCOVERY);
            info!(%chain, queued = queue.len(), "discovery cycle complete");
        }
    }

    /// One polling sweep: for each chain, take a bounded batch of queued
    /// addresses, fetch their live snapshot, validate, update the rolling
    /// baseline, and emit a PairUpdate when the change is material.
    pub async fn poll_cycle(&self) {
        let chains = self.config.read().chains.clone();
        let min_liq_list = self.config.read().min_liq_list;
        let now = now_ms();

        for chain in chains {
            let batch = {
                let queues = self.queues.read();
                queues
                    .get(&chain)
                    .map(|q| q.next_batch(POLL_BATCH_SIZE, now))
                    .unwrap_or_default()
            };

            for address in batch {
                self.poll_one(chain, &address, min_liq_list, now).await;
            }

            self.health.record_tick(chain, now_ms());
        }
    }

    async fn poll_one(&self, chain: ChainId, pair_address: &str, min_liq_list: f64, now: i64) {
        let cache_key = format!("pair:{chain}:{pair_address}");
        let fetched = if let Some(cached) = self.cache.get_typed::<DexPair>(&cache_key) {
            Some(cached)
        } else {
            self.health.record_call("dexscreener", now);
            match self
                .dex
                .pair_snapshot(chain.dex_chain_slug(), pair_address)
                .await
            {
                Ok(Some(pair)) => {
                    self.cache.set_typed(&cache_key, &pair, ttl::PAIR_SNAPSHOT);
                    Some(pair)
                }
                Ok(None) => {
                    self.cool_down(chain, pair_address, now, "not_found");
                    None
                }
                Err(e) => {
                    self.record_fetch_failure("dexscreener", &e);
                    self.cool_down(chain, pair_address, now, "fetch_failed");
                    None
                }
            }
        };

        let Some(pair) = fetched else { return };

        if !poller::validate(&pair, min_liq_list) {
            self.health.record_dropped("validation_failed");
            self.cool_down(chain, pair_address, now, "invalid");
            return;
        }

        self.seen_pairs
            .write()
            .insert((chain, pair_address.to_string()), now);

        let update = poller::normalize(pair, chain, now);

        {
            let mut baselines = self.baselines.write();
            let baseline = baselines
                .entry((chain, update.token.address.clone()))
                .or_insert_with(Baseline::new);
            baseline.record(update.stats.price_usd, update.stats.vol_15_usd, now);
        }

        if poller::decide_and_record_emit(&self.cache, &update) {
            crate::events::send_coalescing(&self.tx, update).await;
        }
    }

    fn cool_down(&self, chain: ChainId, pair_address: &str, now: i64, reason: &str) {
        self.health.record_dropped(reason);
        let mut queues = self.queues.write();
        if let Some(queue) = queues.get_mut(&chain) {
            queue.set_cooldown(pair_address, now, FAILURE_COOLDOWN_MS);
        }
    }

    fn record_fetch_failure(&self, source: &str, err: &FetchError) {
        let code = match err {
            FetchError::RateLimited(_) => 429,
            FetchError::Http4xx(_, c) | FetchError::Http5xx(_, c) => *c,
            FetchError::Timeout(_, _) => 0,
            FetchError::Network(_, _) => 0,
            FetchError::Decode(_, _) => 0,
        };
        self.health.record_status(code);
        warn!(source, %err, "upstream fetch failed");
    }

    /// Baseline snapshot for a single token, if one has been recorded.
    pub fn baseline_for(&self, chain: ChainId, address: &str) -> Option<Baseline> {
        self.baselines
            .read()
            .get(&(chain, address.to_string()))
            .cloned()
    }

    /// Evict baselines that have not been updated within `max_age_hours`
    /// (spec §3 lifecycle). Intended to be called from a periodic cleanup
    /// task alongside the Orchestrator's own sweeps.
    pub fn evict_stale_baselines(&self) {
        let max_age_ms = (self.config.read().max_age_hours * 60.0 * 60.0 * 1000.0) as i64;
        let now = now_ms();
        self.baselines
            .write()
            .retain(|_, baseline| !baseline.is_stale(now, max_age_ms));
    }

    pub fn health_snapshot(&self) -> HealthSnapshot {
        let queue_sizes: HashMap<ChainId, usize> = self
            .queues
            .read()
            .iter()
            .map(|(chain, q)| (*chain, q.len()))
            .collect();
        let cache_hit_ratio = self.cache.stats().hit_ratio_ema;
        self.health.snapshot(queue_sizes, cache_hit_ratio, now_ms())
    }
}

fn to_plain_map(
    seen: &HashMap<(ChainId, String), i64>,
    chain: ChainId,
) -> HashMap<String, i64> {
    seen.iter()
        .filter(|((c, _), _)| *c == chain)
        .map(|((_, addr), ts)| (addr.clone(), *ts))
        .collect()
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
