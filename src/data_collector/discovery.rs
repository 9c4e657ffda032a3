// =============================================================================
// DiscoveryQueue — per-chain set of candidate pair addresses with cooldowns
// =============================================================================

use std::collections::{HashMap, HashSet};

/// Per-chain discovery state. Owned exclusively by the DataCollector.
#[derive(Debug, Default)]
pub struct DiscoveryQueue {
    pub pair_addresses: HashSet<String>,
    /// Address -> unix millis until which it should be skipped by the poller.
    pub cooldown_pairs: HashMap<String, i64>,
    /// Unix millis of the last completed discovery cycle.
    pub last_refresh: i64,
}

impl DiscoveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a candidate address discovered this cycle.
    pub fn add_candidate(&mut self, address: String) {
        self.pair_addresses.insert(address);
    }

    /// Place `address` in cooldown until `now_ms + duration_ms`.
    pub fn set_cooldown(&mut self, address: &str, now_ms: i64, duration_ms: i64) {
        self.cooldown_pairs
            .insert(address.to_string(), now_ms + duration_ms);
    }

    /// Whether `address` is currently in its cooldown window.
    pub fn is_in_cooldown(&self, address: &str, now_ms: i64) -> bool {
        self.cooldown_pairs
            .get(address)
            .is_some_and(|until| *until > now_ms)
    }

    /// Drop queue entries that are either stale (unseen for longer than
    /// `max_age_ms`) or whose cooldown has not yet elapsed, per spec §4.4
    /// ("prune queue entries whose seenPairs[addr] + MAX_AGE is in the past,
    /// or whose cooldownPairs[addr] > now").
    pub fn prune(&mut self, now_ms: i64, max_age_ms: i64, seen_pairs: &HashMap<String, i64>) {
        self.pair_addresses.retain(|addr| {
            let seen_recently = seen_pairs
                .get(addr)
                .is_some_and(|seen| now_ms - seen <= max_age_ms);
            let never_seen = !seen_pairs.contains_key(addr);
            (seen_recently || never_seen) && !self.is_in_cooldown(addr, now_ms)
        });
        self.cooldown_pairs.retain(|_, until| *until > now_ms);
    }

    /// Take up to `batch_size` addresses for the next polling batch.
    /// Ordering is irrelevant per spec §4.4; iteration order of the
    /// underlying set is used as-is.
    pub fn next_batch(&self, batch_size: usize, now_ms: i64) -> Vec<String> {
        self.pair_addresses
            .iter()
            .filter(|addr| !self.is_in_cooldown(addr, now_ms))
            .take(batch_size)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pair_addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pair_addresses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_address_is_excluded_from_next_batch() {
        let mut q = DiscoveryQueue::new();
        q.add_candidate("Addr1".to_string());
        q.set_cooldown("Addr1", 1_000, 60_000);
        let batch = q.next_batch(10, 1_000);
        assert!(batch.is_empty());
    }

    #[test]
    fn prune_drops_stale_and_cooled_down_entries() {
        let mut q = DiscoveryQueue::new();
        q.add_candidate("Stale".to_string());
        q.add_candidate("Fresh".to_string());
        q.add_candidate("Cooling".to_string());
        q.set_cooldown("Cooling", 0, 1_000_000);

        let mut seen = HashMap::new();
        seen.insert("Stale".to_string(), 0);
        seen.insert("Fresh".to_string(), 100_000);

        q.prune(200_000, 60_000, &seen);

        assert!(!q.pair_addresses.contains("Stale"));
        assert!(q.pair_addresses.contains("Fresh"));
        assert!(!q.pair_addresses.contains("Cooling"));
    }

    #[test]
    fn never_seen_candidate_survives_prune() {
        let mut q = DiscoveryQueue::new();
        q.add_candidate("JustDiscovered".to_string());
        let seen = HashMap::new();
        q.prune(0, 60_000, &seen);
        assert!(q.pair_addresses.contains("JustDiscovered"));
    }
}
