// =============================================================================
// Poller — pair validation, normalization, and emit-dedup decision
// =============================================================================
//
// Pure logic lives here so it can be unit-tested without a network or an
// async runtime; `DataCollector::run_poll_cycle` (mod.rs) is the async glue
// that calls into these functions once per fetched snapshot.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::cache::{ttl, Cache};
use crate::sources::dexscreener::DexPair;
use crate::types::{ChainId, PairStats, PairUpdate, TokenRef};

/// Fallback multiplier used only when the upstream omits `vol_15_usd`
/// entirely (Open Question #2 — see DESIGN.md): `vol_15 = vol_5 * 3.0`.
pub const SYNTHETIC_VOL15_MULTIPLIER: f64 = 3.0;

/// All conditions of spec §4.4 "Pair validation" must hold to accept a
/// fetched pair into the pipeline. `min_liq_list` comes from the live
/// `RuntimeConfig` snapshot so an admin-updated threshold takes effect on
/// the very next poll.
pub fn validate(pair: &DexPair, min_liq_list: f64) -> bool {
    !pair.base_address.is_empty()
        && !pair.base_symbol.is_empty()
        && pair.price_usd > 0.0
        && pair.liquidity_usd >= min_liq_list
        && !pair.pair_address.is_empty()
}

/// Normalize a validated upstream `DexPair` into the canonical `PairUpdate`.
pub fn normalize(pair: DexPair, chain_id: ChainId, now_ms: i64) -> PairUpdate {
    let vol_15_usd = pair
        .vol_15_usd
        .unwrap_or(pair.vol_5_usd * SYNTHETIC_VOL15_MULTIPLIER);

    PairUpdate {
        chain_id,
        pair_address: pair.pair_address,
        token: TokenRef {
            chain_id,
            address: pair.base_address,
            symbol: pair.base_symbol,
            name: pair.base_name,
        },
        stats: PairStats {
            buys_5: pair.buys_5,
            sells_5: pair.sells_5,
            vol_5_usd: pair.vol_5_usd,
            vol_15_usd,
            vol_24h_usd: pair.vol_24h_usd,
            price_usd: pair.price_usd,
            price_change_5m: pair.price_change_5m,
            liquidity_usd: pair.liquidity_usd,
            fdv_usd: pair.fdv_usd,
            pair_created_at: pair.pair_created_at,
        },
        boosts_active: pair.boosts_active,
        ts: now_ms,
    }
}

/// The minimal snapshot retained per `(chain,pair)` to decide whether a fresh
/// update is materially different enough to emit. Cached under
/// `last_emit:{chain}:{pair}` with the `ttl::LAST_EMIT` policy TTL.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LastEmitSnapshot {
    pub price_usd: f64,
    pub vol_5_usd: f64,
    pub liquidity_usd: f64,
    pub ts: i64,
}

impl From<&PairUpdate> for LastEmitSnapshot {
    fn from(u: &PairUpdate) -> Self {
        Self {
            price_usd: u.stats.price_usd,
            vol_5_usd: u.stats.vol_5_usd,
            liquidity_usd: u.stats.liquidity_usd,
            ts: u.ts,
        }
    }
}

const HEARTBEAT_MS: i64 = 5 * 60 * 1000;
const CHANGE_THRESHOLD: f64 = 0.05;

fn last_emit_key(chain_id: ChainId, pair_address: &str) -> String {
    format!("last_emit:{chain_id}:{pair_address}")
}

/// `|Δprice|/prevPrice` and `|Δliquidity|/prevLiquidity` (spec §4.4): divides
/// by the previous value directly, not `prev.max(1.0)`. Only the `vol_5`
/// branch floors its denominator at 1 (see `relative_change_floored`) — prices
/// and liquidity are guaranteed `> 0` by `validate`, so dividing by `prev`
/// directly is safe and, unlike flooring at 1, doesn't collapse sub-$1
/// memecoin prices to a denominator that can never trip the 5% threshold.
fn relative_change(prev: f64, current: f64) -> f64 {
    (current - prev).abs() / prev
}

/// `|Δvol5|/max(prevVol5,1)` (spec §4.4) — the one branch whose denominator
/// is floored at 1, since `vol_5_usd` may legitimately be 0.
fn relative_change_floored(prev: f64, current: f64) -> f64 {
    (current - prev).abs() / prev.max(1.0)
}

/// Decide whether `update` should be emitted given the cached last-emitted
/// snapshot for its `(chain,pair)`, per spec §4.4's emit decision. When the
/// update is emitted, the cache is refreshed to the new snapshot so the next
/// decision compares against it.
pub fn decide_and_record_emit(cache: &Cache, update: &PairUpdate) -> bool {
    let key = last_emit_key(update.chain_id, &update.pair_address);
    let prev: Option<LastEmitSnapshot> = cache.get_typed(&key);

    let should_emit = match prev {
        None => true,
        Some(p) => {
            relative_change(p.price_usd, update.stats.price_usd) > CHANGE_THRESHOLD
                || relative_change_floored(p.vol_5_usd, update.stats.vol_5_usd) > CHANGE_THRESHOLD
                || relative_change(p.liquidity_usd, update.stats.liquidity_usd) > CHANGE_THRESHOLD
                || update.ts - p.ts > HEARTBEAT_MS
        }
    };

    if should_emit {
        let snapshot = LastEmitSnapshot::from(update);
        cache.set_typed(&key, &snapshot, ttl::LAST_EMIT);
    }

    should_emit
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_pair() -> DexPair {
        DexPair {
            chain_id: "solana".to_string(),
            pair_address: "Pair1".to_string(),
            base_address: "Addr1".to_string(),
            base_name: "Foo".to_string(),
            base_symbol: "FOO".to_string(),
            price_usd: 0.001,
            buys_5: 10,
            sells_5: 5,
            vol_5_usd: 1000.0,
            vol_15_usd: Some(3000.0),
            vol_24h_usd: Some(50_000.0),
            price_change_5m: 2.0,
            liquidity_usd: 20_000.0,
            fdv_usd: Some(500_000.0),
            pair_created_at: 1_700_000_000,
            boosts_active: 0,
        }
    }

    #[test]
    fn valid_pair_passes_validation() {
        assert!(validate(&base_pair(), 12_000.0));
    }

    #[test]
    fn pair_below_min_liquidity_is_rejected() {
        let mut p = base_pair();
        p.liquidity_usd = 100.0;
        assert!(!validate(&p, 12_000.0));
    }

    #[test]
    fn zero_price_is_rejected() {
        let mut p = base_pair();
        p.price_usd = 0.0;
        assert!(!validate(&p, 12_000.0));
    }

    #[test]
    fn missing_vol15_falls_back_to_tripled_vol5() {
        let mut p = base_pair();
        p.vol_15_usd = None;
        p.vol_5_usd = 500.0;
        let update = normalize(p, ChainId::Sol, 0);
        assert_eq!(update.stats.vol_15_usd, 1500.0);
    }

    #[test]
    fn first_update_for_a_pair_is_always_emitted() {
        let cache = Cache::new();
        let update = normalize(base_pair(), ChainId::Sol, 1_000);
        assert!(decide_and_record_emit(&cache, &update));
    }

    #[test]
    fn small_changes_within_five_minutes_suppress_emission() {
        let cache = Cache::new();
        let first = normalize(base_pair(), ChainId::Sol, 0);
        assert!(decide_and_record_emit(&cache, &first));

        let mut p2 = base_pair();
        p2.price_usd *= 1.005; // +0.5%
        p2.vol_5_usd *= 1.01; // +1%
        let second = normalize(p2, ChainId::Sol, 90_000);
        assert!(!decide_and_record_emit(&cache, &second));
    }

    #[test]
    fn large_price_change_triggers_emission() {
        let cache = Cache::new();
        let first = normalize(base_pair(), ChainId::Sol, 0);
        assert!(decide_and_record_emit(&cache, &first));

        let mut p2 = base_pair();
        p2.price_usd *= 1.10; // +10%
        let second = normalize(p2, ChainId::Sol, 1_000);
        assert!(decide_and_record_emit(&cache, &second));
    }

    #[test]
    fn heartbeat_emits_after_five_minutes_without_other_changes() {
        let cache = Cache::new();
        let first = normalize(base_pair(), ChainId::Sol, 0);
        assert!(decide_and_record_emit(&cache, &first));

        let second = normalize(base_pair(), ChainId::Sol, 6 * 60 * 1000);
        assert!(decide_and_record_emit(&cache, &second));
    }
}
