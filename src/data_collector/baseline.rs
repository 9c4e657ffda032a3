// =============================================================================
// Baseline — per-token rolling price/volume statistics
// =============================================================================
//
// One Baseline per `(chainId, address)`. Mutated exclusively by the
// DataCollector; other components only read snapshots. Price/volume history
// is pruned to the trailing 30 minutes on every update (spec §3 invariant:
// "Baseline histories are monotonic in ts and contain only points within the
// last 30 minutes").
//
// Slope computation follows spec §4.4 literally: an ordinary-least-squares
// regression of price on sample index (not wall-clock time) over the
// subsequence of points falling within the trailing 1-minute / 5-minute
// window. This is the authoritative definition; §4.6's restated
// `slope_n = (P_last - P_{last-n})/P_{last-n}` describes what the slope
// represents (a rate of change) rather than a second computation — see
// DESIGN.md for this resolution.
// =============================================================================

use std::collections::VecDeque;

const HISTORY_WINDOW_MS: i64 = 30 * 60 * 1000;
const SLOPE_1M_WINDOW_MS: i64 = 60 * 1000;
const SLOPE_5M_WINDOW_MS: i64 = 5 * 60 * 1000;
const VOL15_EWMA_ALPHA: f64 = 0.1;

/// Rolling per-token baseline, owned by the DataCollector.
#[derive(Debug, Clone)]
pub struct Baseline {
    pub vol15_ewma: f64,
    /// The EWMA value as it stood immediately before the most recent
    /// update — this is the "baseline prior to this point" the Scorer's
    /// `surge15` signal compares the fresh `vol_15_usd` against.
    pub vol15_ewma_prior: f64,
    pub price_slope_1m: f64,
    pub price_slope_5m: f64,
    pub price_history: VecDeque<(f64, i64)>,
    pub volume_history: VecDeque<(f64, i64)>,
    pub last_updated: i64,
    /// Total observations ever recorded (not reset by pruning), used by the
    /// Scorer to decide whether enough history exists for `surge15`.
    pub sample_count: u32,
}

impl Baseline {
    pub fn new() -> Self {
        Self {
            vol15_ewma: 0.0,
            vol15_ewma_prior: 0.0,
            price_slope_1m: 0.0,
            price_slope_5m: 0.0,
            price_history: VecDeque::new(),
            volume_history: VecDeque::new(),
            last_updated: 0,
            sample_count: 0,
        }
    }

    /// Record a fresh `(price_usd, vol_15_usd)` observation at `now_ms`.
    pub fn record(&mut self, price_usd: f64, vol_15_usd: f64, now_ms: i64) {
        self.price_history.push_back((price_usd, now_ms));
        self.volume_history.push_back((vol_15_usd, now_ms));
        self.prune(now_ms);

        self.price_slope_1m = ols_slope_over_window(&self.price_history, now_ms, SLOPE_1M_WINDOW_MS);
        self.price_slope_5m = ols_slope_over_window(&self.price_history, now_ms, SLOPE_5M_WINDOW_MS);

        self.vol15_ewma_prior = self.vol15_ewma;
        self.vol15_ewma = if self.sample_count == 0 {
            vol_15_usd
        } else {
            (1.0 - VOL15_EWMA_ALPHA) * self.vol15_ewma + VOL15_EWMA_ALPHA * vol_15_usd
        };

        self.sample_count += 1;
        self.last_updated = now_ms;
    }

    fn prune(&mut self, now_ms: i64) {
        let cutoff = now_ms - HISTORY_WINDOW_MS;
        while self.price_history.front().is_some_and(|(_, ts)| *ts < cutoff) {
            self.price_history.pop_front();
        }
        while self.volume_history.front().is_some_and(|(_, ts)| *ts < cutoff) {
            self.volume_history.pop_front();
        }
    }

    /// Whether no update for longer than `max_age_ms` has been seen — used
    /// by the collector to evict stale baselines (spec §3 lifecycle).
    pub fn is_stale(&self, now_ms: i64, max_age_ms: i64) -> bool {
        self.last_updated > 0 && now_ms - self.last_updated > max_age_ms
    }
}

impl Default for Baseline {
    fn default() -> Self {
        Self::new()
    }
}

/// OLS slope of `history`'s price values against their sample index, limited
/// to the subsequence falling within `window_ms` of `now_ms`. Returns 0.0 if
/// fewer than two points fall in the window (spec §8 boundary case: "Price
/// history <= 2 points -> slope = 0").
fn ols_slope_over_window(history: &VecDeque<(f64, i64)>, now_ms: i64, window_ms: i64) -> f64 {
    let cutoff = now_ms - window_ms;
    let points: Vec<f64> = history
        .iter()
        .filter(|(_, ts)| *ts >= cutoff)
        .map(|(price, _)| *price)
        .collect();

    if points.len() < 2 {
        return 0.0;
    }

    let n = points.len() as f64;
    let x_mean = (n - 1.0) / 2.0; // mean of 0..n-1
    let y_mean = points.iter().sum::<f64>() / n;

    let mut numerator = 0.0_f64;
    let mut denominator = 0.0_f64;
    for (i, &y) in points.iter().enumerate() {
        let dx = i as f64 - x_mean;
        let dy = y - y_mean;
        numerator += dx * dy;
        denominator += dx * dx;
    }

    if denominator.abs() < f64::EPSILON {
        return 0.0;
    }
    numerator / denominator
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_baseline_starts_at_zero() {
        let b = Baseline::new();
        assert_eq!(b.vol15_ewma, 0.0);
        assert_eq!(b.sample_count, 0);
    }

    #[test]
    fn first_observation_seeds_ewma_directly() {
        let mut b = Baseline::new();
        b.record(1.0, 30_000.0, 1000);
        assert_eq!(b.vol15_ewma, 30_000.0);
        assert_eq!(b.vol15_ewma_prior, 0.0);
    }

    #[test]
    fn second_observation_blends_with_prior_ewma() {
        let mut b = Baseline::new();
        b.record(1.0, 30_000.0, 1000);
        b.record(1.0, 90_000.0, 2000);
        // (1 - 0.1)*30000 + 0.1*90000 = 36000
        assert!((b.vol15_ewma - 36_000.0).abs() < 1e-6);
        assert_eq!(b.vol15_ewma_prior, 30_000.0);
    }

    #[test]
    fn history_is_pruned_past_thirty_minutes() {
        let mut b = Baseline::new();
        b.record(1.0, 100.0, 0);
        b.record(1.0, 100.0, 31 * 60 * 1000);
        assert_eq!(b.price_history.len(), 1);
        assert_eq!(b.price_history[0].1, 31 * 60 * 1000);
    }

    #[test]
    fn slope_is_zero_with_fewer_than_two_points_in_window() {
        let mut b = Baseline::new();
        b.record(1.0, 100.0, 0);
        assert_eq!(b.price_slope_1m, 0.0);
    }

    #[test]
    fn rising_price_produces_positive_slope() {
        let mut b = Baseline::new();
        b.record(1.0, 100.0, 0);
        b.record(1.05, 100.0, 10_000);
        b.record(1.10, 100.0, 20_000);
        assert!(b.price_slope_1m > 0.0);
    }

    #[test]
    fn is_stale_after_max_age_elapsed() {
        let mut b = Baseline::new();
        b.record(1.0, 100.0, 0);
        assert!(!b.is_stale(10_000, 60_000));
        assert!(b.is_stale(100_000, 60_000));
    }
}
