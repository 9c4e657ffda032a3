// =============================================================================
// Sentinel — staggered CEX announcement scraping and listing detection
// =============================================================================
//
// One recurring task per monitored exchange (spec §4.8, §5), offset so the
// six exchanges' fetches spread evenly across the refresh interval instead
// of bursting together. Each task runs the state machine `idle -> fetching
// -> parsing -> dedup -> emitting -> idle`; a failure in any phase is
// swallowed, logged, and counted — the task returns to idle and tries again
// next tick rather than dying (mirrors DataCollector's per-chain isolation
// in mod.rs).
// =============================================================================

pub mod parser;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use crate::http_fetcher::HttpFetcher;
use crate::rate_limiter::RateLimiter;
use crate::runtime_config::RuntimeConfig;
use crate::sources::exchanges::{Exchange, ExchangeAnnouncementSource};
use crate::sources::symbol_directory::SymbolDirectorySource;
use crate::types::{CexListingEvent, ListingConfirmation, ListingTokenRef};

use parser::Announcement;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Fetching,
    Parsing,
    Dedup,
    Emitting,
}

struct ExchangeState {
    last_identity: Option<String>,
    phase: Phase,
    error_count: u32,
}

impl ExchangeState {
    fn new() -> Self {
        Self {
            last_identity: None,
            phase: Phase::Idle,
            error_count: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SentinelHealthSnapshot {
    pub phases: HashMap<String, Phase>,
    pub error_counts: HashMap<String, u32>,
}

pub struct Sentinel {
    announcements: ExchangeAnnouncementSource,
    symbol_directory: SymbolDirectorySource,
    config: Arc<RwLock<RuntimeConfig>>,
    states: RwLock<HashMap<Exchange, ExchangeState>>,
    listing_tx: mpsc::Sender<CexListingEvent>,
}

impl Sentinel {
    pub fn new(
        rate_limiter: Arc<RateLimiter>,
        config: Arc<RwLock<RuntimeConfig>>,
        listing_tx: mpsc::Sender<CexListingEvent>,
    ) -> Self {
        let fetcher = Arc::new(HttpFetcher::new(rate_limiter));
        let states = Exchange::ALL
            .into_iter()
            .map(|e| (e, ExchangeState::new()))
            .collect();
        Self {
            announcements: ExchangeAnnouncementSource::new(fetcher.clone()),
            symbol_directory: SymbolDirectorySource::new(fetcher),
            config,
            states: RwLock::new(states),
            listing_tx,
        }
    }

    /// Spawn one staggered recurring task per monitored exchange. Returns
    /// immediately; each task runs until the process exits (mirrors
    /// DataCollector::spawn_all's fire-and-forget style).
    pub fn spawn_all(self: Arc<Self>) {
        let n = Exchange::ALL.len() as u64;
        for (i, exchange) in Exchange::ALL.into_iter().enumerate() {
            let sentinel = self.clone();
            tokio::spawn(async move {
                let interval_ms = sentinel.config.read().sentinel_refresh_ms;
                let offset_ms = (i as u64) * (interval_ms / n.max(1));
                tokio::time::sleep(Duration::from_millis(offset_ms)).await;

                loop {
                    sentinel.run_once(exchange).await;
                    let interval_ms = sentinel.config.read().sentinel_refresh_ms;
                    tokio::time::sleep(Duration::from_millis(interval_ms)).await;
                }
            });
        }
    }

    fn set_phase(&self, exchange: Exchange, phase: Phase) {
        if let Some(state) = self.states.write().get_mut(&exchange) {
            state.phase = phase;
        }
    }

    fn bump_error(&self, exchange: Exchange) {
        if let Some(state) = self.states.write().get_mut(&exchange) {
            state.error_count += 1;
            state.phase = Phase::Idle;
        }
    }

    /// Run one full cycle for `exchange`: fetch, parse, filter to listing
    /// announcements, dedup against the last-seen identity, enrich with an
    /// on-chain address, and emit. Any failure returns the task to idle with
    /// its error counter bumped; it never panics or aborts the recurring
    /// loop (spec §4.8 state machine).
    #[instrument(skip(self), fields(exchange = exchange.as_str()))]
    pub async fn run_once(&self, exchange: Exchange) {
        self.set_phase(exchange, Phase::Fetching);
        let body = match self.announcements.fetch_index(exchange).await {
            Ok(body) => body,
            Err(e) => {
                warn!(exchange = exchange.as_str(), %e, "sentinel fetch failed");
                self.bump_error(exchange);
                return;
            }
        };

        self.set_phase(exchange, Phase::Parsing);
        let mut candidates = parser::extract_announcements(exchange, &body);
        candidates.sort_by(|a, b| b.published_at.cmp(&a.published_at));

        self.set_phase(exchange, Phase::Dedup);
        let last_identity = self
            .states
            .read()
            .get(&exchange)
            .and_then(|s| s.last_identity.clone());
        let fresh = select_new_announcements(&candidates, last_identity.as_deref());

        if let Some(newest) = candidates.first() {
            if let Some(state) = self.states.write().get_mut(&exchange) {
                state.last_identity = Some(newest.identity());
            }
        }

        if fresh.is_empty() {
            self.set_phase(exchange, Phase::Idle);
            return;
        }

        self.set_phase(exchange, Phase::Emitting);
        for announcement in fresh {
            if !parser::is_listing_announcement(&announcement.title, announcement.content.as_deref()) {
                continue;
            }
            self.emit(announcement).await;
        }
        self.set_phase(exchange, Phase::Idle);
    }

    async fn emit(&self, announcement: Announcement) {
        for symbol in &announcement.tokens {
            let resolved = self.symbol_directory.resolve(symbol).await;
            let (address, chain_id, confirmation) = match resolved {
                Ok(Some(r)) => (Some(r.address), Some(r.chain_id), ListingConfirmation::Address),
                _ => (None, None, ListingConfirmation::SymbolOnly),
            };

            let event = CexListingEvent {
                source: "sentinel".to_string(),
                exchange: announcement.exchange.clone(),
                markets: announcement.markets.clone(),
                urls: vec![announcement.url.clone()],
                token: ListingTokenRef {
                    symbol: symbol.clone(),
                    address,
                    chain_id,
                },
                confirmation,
                radar_score: 75.0,
                liquidity_usd: 0.0,
                ts: announcement.published_at,
            };

            info!(
                exchange = %event.exchange,
                symbol = %event.token.symbol,
                "sentinel detected cex listing"
            );

            if self.listing_tx.send(event).await.is_err() {
                warn!("listing channel closed, dropping sentinel event");
                return;
            }
        }

        // No symbol candidates extracted at all — still emit a symbol-only
        // event so the Orchestrator can surface the raw announcement.
        if announcement.tokens.is_empty() {
            let event = CexListingEvent {
                source: "sentinel".to_string(),
                exchange: announcement.exchange.clone(),
                markets: announcement.markets.clone(),
                urls: vec![announcement.url.clone()],
                token: ListingTokenRef {
                    symbol: announcement.title.clone(),
                    address: None,
                    chain_id: None,
                },
                confirmation: ListingConfirmation::SymbolOnly,
                radar_score: 75.0,
                liquidity_usd: 0.0,
                ts: announcement.published_at,
            };
            let _ = self.listing_tx.send(event).await;
        }
    }

    pub fn health_snapshot(&self) -> SentinelHealthSnapshot {
        let states = self.states.read();
        SentinelHealthSnapshot {
            phases: states
                .iter()
                .map(|(e, s)| (e.as_str().to_string(), s.phase))
                .collect(),
            error_counts: states
                .iter()
                .map(|(e, s)| (e.as_str().to_string(), s.error_count))
                .collect(),
        }
    }
}

/// Given `sorted_desc` (newest first) and the previously recorded identity,
/// return the announcements that are new since last run, oldest-first
/// (ready for in-order emission). On the very first run (`last_identity ==
/// None`) only the single most recent announcement is returned (spec §4.8).
fn select_new_announcements(sorted_desc: &[Announcement], last_identity: Option<&str>) -> Vec<Announcement> {
    match last_identity {
        None => sorted_desc.first().cloned().into_iter().collect(),
        Some(last) => {
            let mut fresh = Vec::new();
            for ann in sorted_desc {
                if ann.identity() == last {
                    break;
                }
                fresh.push(ann.clone());
            }
            fresh.reverse();
            fresh
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ann(title: &str, ts: i64) -> Announcement {
        Announcement {
            exchange: "kucoin".to_string(),
            title: title.to_string(),
            content: None,
            url: "u".to_string(),
            published_at: ts,
            tokens: vec![],
            markets: vec![],
        }
    }

    #[test]
    fn first_run_returns_only_the_single_most_recent() {
        let sorted = vec![ann("C", 300), ann("B", 200), ann("A", 100)];
        let fresh = select_new_announcements(&sorted, None);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].title, "C");
    }

    #[test]
    fn subsequent_run_returns_everything_newer_than_last_identity() {
        let sorted = vec![ann("D", 400), ann("C", 300), ann("B", 200), ann("A", 100)];
        let last = ann("B", 200).identity();
        let fresh = select_new_announcements(&sorted, Some(&last));
        assert_eq!(fresh.iter().map(|a| a.title.as_str()).collect::<Vec<_>>(), vec!["C", "D"]);
    }

    #[test]
    fn no_new_announcements_when_last_identity_is_the_newest() {
        let sorted = vec![ann("B", 200), ann("A", 100)];
        let last = ann("B", 200).identity();
        let fresh = select_new_announcements(&sorted, Some(&last));
        assert!(fresh.is_empty());
    }

    #[test]
    fn unmatched_last_identity_returns_everything() {
        let sorted = vec![ann("B", 200), ann("A", 100)];
        let fresh = select_new_announcements(&sorted, Some("stale-identity-999"));
        assert_eq!(fresh.len(), 2);
    }
}
