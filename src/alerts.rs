// =============================================================================
// AlertSink — dedup/cooldown-gated out-of-process alert dispatch
// =============================================================================
//
// The core never delivers alerts itself (spec §1 Out of scope: "alert
// delivery formatting to chat platforms"); it only decides *whether* to
// dispatch and hands the decision to whatever `AlertSink` the deployment
// wires in. `LoggingAlertSink` is the default, teacher-style implementation:
// log the event and keep a bounded ring buffer for inspection.
// =============================================================================

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::TokenSummary;

const ALERT_COOLDOWN_MS: i64 = 30 * 60 * 1000;
const LISTING_ALERT_COOLDOWN_MS: i64 = 24 * 60 * 60 * 1000;
const REISSUE_SCORE_DELTA: f64 = 10.0;
const HOUR_MS: i64 = 60 * 60 * 1000;
const RING_BUFFER_CAP: usize = 200;

/// A momentum alert: the token crossed every threshold in the alert-dispatch
/// contract (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumAlert {
    pub token: TokenSummary,
}

/// A CEX listing alert, raised from `Orchestrator::handle_listing_event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingAlert {
    pub address: String,
    pub exchange: String,
    pub summary: TokenSummary,
}

/// Destination for dispatched alerts. Implementations must be cheap and
/// non-blocking; the Orchestrator calls these inline during a pipeline pass.
pub trait AlertSink: Send + Sync {
    fn momentum(&self, alert: &MomentumAlert);
    fn listing(&self, alert: &ListingAlert);
}

/// Default sink: structured log line plus a bounded in-memory history,
/// mirroring the teacher's preference for `tracing` over ad-hoc printing.
pub struct LoggingAlertSink {
    history: Mutex<VecDeque<String>>,
}

impl LoggingAlertSink {
    pub fn new() -> Self {
        Self {
            history: Mutex::new(VecDeque::with_capacity(RING_BUFFER_CAP)),
        }
    }

    fn record(&self, line: String) {
        let mut history = self.history.lock();
        if history.len() >= RING_BUFFER_CAP {
            history.pop_front();
        }
        history.push_back(line);
    }

    pub fn recent(&self) -> Vec<String> {
        self.history.lock().iter().cloned().collect()
    }
}

impl Default for LoggingAlertSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertSink for LoggingAlertSink {
    fn momentum(&self, alert: &MomentumAlert) {
        let line = format!(
            "momentum alert: {} ({}) score={:.1}",
            alert.token.token.symbol,
            alert.token.address(),
            alert.token.score
        );
        info!(
            address = alert.token.address(),
            score = alert.token.score,
            "momentum alert"
        );
        self.record(line);
    }

    fn listing(&self, alert: &ListingAlert) {
        let line = format!(
            "listing alert: {} listed on {}",
            alert.summary.token.symbol, alert.exchange
        );
        info!(
            address = %alert.address,
            exchange = %alert.exchange,
            "cex listing alert"
        );
        self.record(line);
    }
}

/// Whether `summary` satisfies every clause of the momentum alert-dispatch
/// contract (spec §6). Eligibility (security/liquidity/age/score-55) is a
/// separate, weaker gate checked upstream by the Scorer; this gate is
/// strictly tighter.
pub fn meets_alert_thresholds(
    summary: &TokenSummary,
    score_alert: f64,
    surge15_min: f64,
    imbalance5_min: f64,
    min_liq_alert: f64,
) -> bool {
    if !summary.security.ok || summary.liquidity_usd < min_liq_alert {
        return false;
    }
    if summary.score < score_alert {
        return false;
    }
    let surge_gate = summary.vol_15_usd / (2.0 * summary.vol_5_usd).max(1.0);
    if surge_gate < surge15_min {
        return false;
    }
    let imbalance = crate::scorer::imbalance5(summary.buys_5, summary.sells_5);
    imbalance >= imbalance5_min
}

struct HourlyCounter {
    window_start_ms: i64,
    count: u32,
}

/// Owns the dedup/cooldown/rate-ceiling state for both alert kinds. A single
/// instance lives inside the Orchestrator; all of its methods take `&mut
/// self` because they are only ever called from the single pipeline-consumer
/// task (spec §5 "Pinned-token store is owned by Orchestrator, single
/// writer" — the same single-writer discipline applies here).
pub struct AlertGate {
    last_momentum: HashMap<String, (i64, f64)>,
    last_listing: HashMap<(String, String), i64>,
    hourly: HourlyCounter,
}

impl AlertGate {
    pub fn new() -> Self {
        Self {
            last_momentum: HashMap::new(),
            last_listing: HashMap::new(),
            hourly: HourlyCounter {
                window_start_ms: 0,
                count: 0,
            },
        }
    }

    fn tick_hourly(&mut self, now_ms: i64, ceiling: u32) -> bool {
        if now_ms - self.hourly.window_start_ms >= HOUR_MS {
            self.hourly.window_start_ms = now_ms;
            self.hourly.count = 0;
        }
        if self.hourly.count >= ceiling {
            return false;
        }
        self.hourly.count += 1;
        true
    }

    /// Decide whether a momentum alert for `summary` should actually be
    /// dispatched, applying the 30-minute dedup cooldown (re-issuable once
    /// score has risen by >=10) and the shared hourly ceiling. Updates
    /// internal dedup state only when the alert is allowed through.
    pub fn should_dispatch_momentum(
        &mut self,
        summary: &TokenSummary,
        now_ms: i64,
        hourly_ceiling: u32,
    ) -> bool {
        let address = summary.address().to_string();
        if let Some((last_ms, last_score)) = self.last_momentum.get(&address) {
            let within_cooldown = now_ms - last_ms < ALERT_COOLDOWN_MS;
            let risen_enough = summary.score - last_score >= REISSUE_SCORE_DELTA;
            if within_cooldown && !risen_enough {
                return false;
            }
        }
        if !self.tick_hourly(now_ms, hourly_ceiling) {
            return false;
        }
        self.last_momentum
            .insert(address, (now_ms, summary.score));
        true
    }

    /// Decide whether a CEX listing alert for `(address, exchange)` should be
    /// dispatched, applying the 24-hour dedup cooldown and the shared hourly
    /// ceiling.
    pub fn should_dispatch_listing(
        &mut self,
        address: &str,
        exchange: &str,
        now_ms: i64,
        hourly_ceiling: u32,
    ) -> bool {
        let key = (address.to_string(), exchange.to_string());
        if let Some(last_ms) = self.last_listing.get(&key) {
            if now_ms - last_ms < LISTING_ALERT_COOLDOWN_MS {
                return false;
            }
        }
        if !self.tick_hourly(now_ms, hourly_ceiling) {
            return false;
        }
        self.last_listing.insert(key, now_ms);
        true
    }
}

impl Default for AlertGate {
    fn default() -> Self {
        Self::new()
    }
}
