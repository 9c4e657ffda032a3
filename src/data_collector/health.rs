// =============================================================================
// DataCollector health counters
// =============================================================================
//
// Exposed to the Orchestrator's health-check consolidation task (spec §4.7,
// §7) as a read-only snapshot. All counters are best-effort; none of this
// gates pipeline behavior.
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;

use crate::types::ChainId;

const TUMBLE_WINDOW_MS: i64 = 60_000;

/// A 1-minute tumbling call counter for a single upstream source.
struct TumblingCounter {
    window_start_ms: i64,
    count: u64,
}

/// Aggregated, serialisable health state for the DataCollector.
pub struct HealthCounters {
    calls_per_source: RwLock<HashMap<String, TumblingCounter>>,
    status_histogram: RwLock<HashMap<u16, u64>>,
    dropped_pairs: RwLock<HashMap<String, u64>>,
    last_tick: RwLock<HashMap<ChainId, i64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub calls_per_minute: HashMap<String, u64>,
    pub status_histogram: HashMap<u16, u64>,
    pub dropped_pairs: HashMap<String, u64>,
    pub queue_sizes: HashMap<String, usize>,
    pub last_tick_ms: HashMap<String, i64>,
    pub cache_hit_ratio: f64,
}

impl HealthCounters {
    pub fn new() -> Self {
        Self {
            calls_per_source: RwLock::new(HashMap::new()),
            status_histogram: RwLock::new(HashMap::new()),
            dropped_pairs: RwLock::new(HashMap::new()),
            last_tick: RwLock::new(HashMap::new()),
        }
    }

    pub fn record_call(&self, source: &str, now_ms: i64) {
        let mut calls = self.calls_per_source.write();
        let entry = calls
            .entry(source.to_string())
            .or_insert_with(|| TumblingCounter {
                window_start_ms: now_ms,
                count: 0,
            });
        if now_ms - entry.window_start_ms >= TUMBLE_WINDOW_MS {
            entry.window_start_ms = now_ms;
            entry.count = 0;
        }
        entry.count += 1;
    }

    pub fn record_status(&self, code: u16) {
        *self.status_histogram.write().entry(code).or_insert(0) += 1;
    }

    pub fn record_dropped(&self, reason: &str) {
        *self.dropped_pairs.write().entry(reason.to_string()).or_insert(0) += 1;
    }

    pub fn record_tick(&self, chain: ChainId, now_ms: i64) {
        self.last_tick.write().insert(chain, now_ms);
    }

    pub fn snapshot(
        &self,
        queue_sizes: HashMap<ChainId, usize>,
        cache_hit_ratio: f64,
        now_ms: i64,
    ) -> HealthSnapshot {
        let calls_per_minute = self
            .calls_per_source
            .read()
            .iter()
            .map(|(source, counter)| {
                let count = if now_ms - counter.window_start_ms >= TUMBLE_WINDOW_MS {
                    0
                } else {
                    counter.count
                };
                (source.clone(), count)
            })
            .collect();

        HealthSnapshot {
            calls_per_minute,
            status_histogram: self.status_histogram.read().clone(),
            dropped_pairs: self.dropped_pairs.read().clone(),
            queue_sizes: queue_sizes
                .into_iter()
                .map(|(chain, n)| (chain.to_string(), n))
                .collect(),
            last_tick_ms: self
                .last_tick
                .read()
                .iter()
                .map(|(chain, ts)| (chain.to_string(), *ts))
                .collect(),
            cache_hit_ratio,
        }
    }
}

impl Default for HealthCounters {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tumbling_counter_resets_after_window_elapses() {
        let h = HealthCounters::new();
        h.record_call("dexscreener", 0);
        h.record_call("dexscreener", 100);
        let snap = h.snapshot(HashMap::new(), 0.0, 200);
        assert_eq!(snap.calls_per_minute["dexscreener"], 2);

        let snap2 = h.snapshot(HashMap::new(), 0.0, 70_000);
        assert_eq!(snap2.calls_per_minute["dexscreener"], 0);
    }

    #[test]
    fn dropped_pairs_accumulate_by_reason() {
        let h = HealthCounters::new();
        h.record_dropped("404_cooldown");
        h.record_dropped("404_cooldown");
        h.record_dropped("validation_failed");
        let snap = h.snapshot(HashMap::new(), 0.0, 0);
        assert_eq!(snap.dropped_pairs["404_cooldown"], 2);
        assert_eq!(snap.dropped_pairs["validation_failed"], 1);
    }
}
