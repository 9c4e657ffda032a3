// =============================================================================
// SecurityAuditor — merges contract-risk and honeypot upstreams into one report
// =============================================================================
//
// Mirrors futures_intel's "merge several independent signals into one
// composite state" shape, but the composite here is an accumulative penalty
// over a fixed flag table (spec §4.5) rather than an averaged bias.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::cache::{ttl, Cache};
use crate::http_fetcher::HttpFetcher;
use crate::rate_limiter::RateLimiter;
use crate::runtime_config::RuntimeConfig;
use crate::sources::goplus::{GoPlusReport, GoPlusSource};
use crate::sources::honeypot::{HoneypotReport, HoneypotSource};
use crate::types::{ChainId, SecurityReport, TokenRef};

const UPSTREAM_DEADLINE: Duration = Duration::from_secs(10);
const MAX_CONCURRENT_SECURITY_CHECKS: usize = 5;
const WAVE_PAUSE: Duration = Duration::from_secs(2);

pub struct SecurityAuditor {
    cache: Arc<Cache>,
    config: Arc<RwLock<RuntimeConfig>>,
    goplus: GoPlusSource,
    honeypot: HoneypotSource,
    semaphore: Arc<Semaphore>,
}

impl SecurityAuditor {
    pub fn new(
        cache: Arc<Cache>,
        config: Arc<RwLock<RuntimeConfig>>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        let fetcher = Arc::new(HttpFetcher::new(rate_limiter));
        Self {
            cache,
            config,
            goplus: GoPlusSource::new(fetcher.clone()),
            honeypot: HoneypotSource::new(fetcher),
            semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_SECURITY_CHECKS)),
        }
    }

    /// Analyze a single token, consulting the cache first. On a cache miss,
    /// both upstreams are consulted in parallel (honeypot is skipped
    /// entirely for non-EVM chains) with an independent 10-second deadline
    /// each; a missing/failed upstream is tolerated, not fatal.
    pub async fn analyze(&self, chain: ChainId, address: &str) -> SecurityReport {
        let cache_key = format!("security:{chain}:{address}");
        if let Some(cached) = self.cache.get_typed::<SecurityReport>(&cache_key) {
            return cached;
        }

        let report = self.analyze_uncached(chain, address).await;
        self.cache.set_typed(&cache_key, &report, ttl::SECURITY);
        report
    }

    async fn analyze_uncached(&self, chain: ChainId, address: &str) -> SecurityReport {
        let goplus_fut = tokio::time::timeout(
            UPSTREAM_DEADLINE,
            self.goplus.token_security(chain, address),
        );
        let honeypot_fut = async {
            if chain.is_evm() {
                tokio::time::timeout(UPSTREAM_DEADLINE, self.honeypot.check(chain, address))
                    .await
                    .ok()
            } else {
                None
            }
        };

        let (goplus_res, honeypot_res) = tokio::join!(goplus_fut, honeypot_fut);

        let goplus = match goplus_res {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                warn!(address, %e, "goplus security check failed");
                None
            }
            Err(_) => {
                warn!(address, "goplus security check timed out");
                None
            }
        };

        let honeypot = match honeypot_res {
            Some(Ok(report)) => report,
            Some(Err(e)) => {
                warn!(address, %e, "honeypot check failed");
                None
            }
            None => None,
        };

        let max_tax = self.config.read().max_tax;
        build_report(address, goplus, honeypot, max_tax)
    }

    /// Analyze a batch of tokens, at most `MAX_CONCURRENT_SECURITY_CHECKS`
    /// running at once, pausing `WAVE_PAUSE` between waves. Per-token
    /// failures degrade to `SecurityReport::degraded`, never aborting the
    /// batch (spec §4.5 "Batching").
    pub async fn analyze_batch(
        self: &Arc<Self>,
        tokens: &[TokenRef],
    ) -> Vec<(TokenRef, SecurityReport)> {
        let mut results = Vec::with_capacity(tokens.len());

        for wave in tokens.chunks(MAX_CONCURRENT_SECURITY_CHECKS) {
            let mut handles = Vec::with_capacity(wave.len());
            for token in wave {
                let auditor = self.clone();
                let token = token.clone();
                let permit = self.semaphore.clone();
                handles.push(tokio::spawn(async move {
                    let _permit = permit.acquire_owned().await;
                    let report = auditor.analyze(token.chain_id, &token.address).await;
                    (token, report)
                }));
            }

            for handle in handles {
                match handle.await {
                    Ok((token, report)) => results.push((token, report)),
                    Err(e) => {
                        warn!(%e, "security audit task panicked");
                    }
                }
            }

            if !wave.is_empty() {
                tokio::time::sleep(WAVE_PAUSE).await;
            }
        }

        results
    }
}

fn build_report(
    address: &str,
    goplus: Option<GoPlusReport>,
    honeypot: Option<HoneypotReport>,
    max_tax: f64,
) -> SecurityReport {
    if goplus.is_none() && honeypot.is_none() {
        return SecurityReport::degraded(address);
    }

    let mut flags = std::collections::BTreeSet::new();
    let mut sources = std::collections::BTreeSet::new();
    let mut penalty = 0.0_f64;

    if let Some(g) = &goplus {
        sources.insert(crate::sources::goplus::SOURCE.to_string());

        if g.honeypot {
            flags.insert("honeypot".to_string());
            penalty += 100.0;
        }
        if g.cannot_sell {
            flags.insert("cannot_sell".to_string());
            penalty += 100.0;
        }
        if g.fake_token {
            flags.insert("fake_token".to_string());
            penalty += 100.0;
        }
        if g.tax_pct > max_tax {
            flags.insert("high_tax".to_string());
            penalty += 15.0;
        }
        if g.upgradeable {
            flags.insert("upgradeable".to_string());
            penalty += 12.0;
        }
        if g.blacklistable {
            flags.insert("blacklistable".to_string());
            penalty += 12.0;
        }
        if g.mintable {
            flags.insert("mintable".to_string());
            penalty += 8.0;
        }
        if g.anti_whale {
            flags.insert("anti_whale".to_string());
            penalty += 5.0;
        }
        if g.trading_cooldown {
            flags.insert("trading_cooldown".to_string());
            penalty += 5.0;
        }
        if g.external_call {
            flags.insert("external_call".to_string());
            penalty += 3.0;
        }
        if g.gas_abuse {
            flags.insert("gas_abuse".to_string());
            penalty += 3.0;
        }
        if g.airdrop_scam {
            flags.insert("airdrop_scam".to_string());
            penalty += 20.0;
        }
    }

    if let Some(h) = &honeypot {
        sources.insert(crate::sources::honeypot::SOURCE.to_string());

        if h.is_honeypot {
            flags.insert("honeypot".to_string());
            penalty += 100.0;
        }
        if h.risk_level > 7 {
            flags.insert("high_risk".to_string());
            penalty += 10.0;
        }
    }

    penalty = penalty.min(100.0);
    let any_fatal = flags.contains("honeypot")
        || flags.contains("cannot_sell")
        || flags.contains("fake_token");
    let security_ok = penalty < 50.0 && !any_fatal;

    SecurityReport {
        address: address.to_string(),
        security_ok,
        penalty,
        flags,
        sources,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn goplus(overrides: impl FnOnce(&mut GoPlusReport)) -> GoPlusReport {
        let mut g = GoPlusReport::default();
        overrides(&mut g);
        g
    }

    #[test]
    fn no_upstream_data_yields_degraded_report() {
        let report = build_report("Addr1", None, None, 10.0);
        assert!(!report.security_ok);
        assert!(report.flags.contains("analysis_failed"));
    }

    #[test]
    fn clean_token_is_security_ok() {
        let g = goplus(|_| {});
        let report = build_report("Addr1", Some(g), None, 10.0);
        assert!(report.security_ok);
        assert_eq!(report.penalty, 0.0);
        assert!(report.flags.is_empty());
    }

    #[test]
    fn honeypot_flag_forces_not_ok_regardless_of_total_penalty() {
        let g = goplus(|g| g.honeypot = true);
        let report = build_report("Addr1", Some(g), None, 10.0);
        assert!(!report.security_ok);
        assert_eq!(report.penalty, 100.0);
    }

    #[test]
    fn accumulative_minor_flags_stay_ok_until_fifty() {
        let g = goplus(|g| {
            g.mintable = true; // 8
            g.blacklistable = true; // 12
            g.anti_whale = true; // 5
            g.trading_cooldown = true; // 5
        });
        let report = build_report("Addr1", Some(g), None, 10.0);
        assert_eq!(report.penalty, 30.0);
        assert!(report.security_ok);
    }

    #[test]
    fn penalty_is_capped_at_one_hundred() {
        let g = goplus(|g| {
            g.honeypot = true; // 100
            g.airdrop_scam = true; // 20
        });
        let report = build_report("Addr1", Some(g), None, 10.0);
        assert_eq!(report.penalty, 100.0);
    }

    #[test]
    fn honeypot_high_risk_level_adds_flag() {
        let h = HoneypotReport {
            is_honeypot: false,
            buy_tax_pct: 0.0,
            sell_tax_pct: 0.0,
            risk_level: 9,
        };
        let report = build_report("Addr1", None, Some(h), 10.0);
        assert!(report.flags.contains("high_risk"));
        assert_eq!(report.penalty, 10.0);
    }

    #[test]
    fn sources_list_reflects_which_upstreams_contributed() {
        let g = goplus(|_| {});
        let h = HoneypotReport::default();
        let report = build_report("Addr1", Some(g), Some(h), 10.0);
        assert!(report.sources.contains(crate::sources::goplus::SOURCE));
        assert!(report.sources.contains(crate::sources::honeypot::SOURCE));
    }
}
