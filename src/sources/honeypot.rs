// =============================================================================
// Honeypot.is adapter — EVM-only sell-simulation check
// =============================================================================

use std::sync::Arc;

use serde::Deserialize;
use tracing::instrument;

use crate::http_fetcher::{FetchError, FetchOptions, HttpFetcher};
use crate::types::ChainId;

pub const SOURCE: &str = "honeypot.is";

const BASE_URL: &str = "https://api.honeypot.is/v2";

fn honeypot_chain_id(chain: ChainId) -> Option<u32> {
    match chain {
        ChainId::Eth => Some(1),
        ChainId::Bsc => Some(56),
        ChainId::Base => Some(8453),
        ChainId::Sol => None,
    }
}

#[derive(Debug, Deserialize)]
struct HoneypotResponse {
    #[serde(default, rename = "honeypotResult")]
    honeypot_result: Option<HoneypotResult>,
    #[serde(default)]
    simulation_result: Option<SimulationResult>,
}

#[derive(Debug, Deserialize)]
struct HoneypotResult {
    #[serde(default, rename = "isHoneypot")]
    is_honeypot: bool,
}

#[derive(Debug, Deserialize)]
struct SimulationResult {
    #[serde(default, rename = "buyTax")]
    buy_tax: f64,
    #[serde(default, rename = "sellTax")]
    sell_tax: f64,
}

/// Normalized honeypot-simulation result.
#[derive(Debug, Clone, Default)]
pub struct HoneypotReport {
    pub is_honeypot: bool,
    pub buy_tax_pct: f64,
    pub sell_tax_pct: f64,
    pub risk_level: u8,
}

pub struct HoneypotSource {
    fetcher: Arc<HttpFetcher>,
}

impl HoneypotSource {
    pub fn new(fetcher: Arc<HttpFetcher>) -> Self {
        Self { fetcher }
    }

    /// Returns `None` immediately for non-EVM chains without issuing a request.
    #[instrument(skip(self))]
    pub async fn check(
        &self,
        chain: ChainId,
        address: &str,
    ) -> Result<Option<HoneypotReport>, FetchError> {
        let Some(chain_id) = honeypot_chain_id(chain) else {
            return Ok(None);
        };

        let url = format!("{BASE_URL}/IsHoneypot?address={address}&chainID={chain_id}");
        let body = self
            .fetcher
            .fetch(SOURCE, &url, FetchOptions::with_timeout(10))
            .await?;
        let parsed: HoneypotResponse = serde_json::from_value(body)
            .map_err(|e| FetchError::Decode(SOURCE.to_string(), e.to_string()))?;

        let is_honeypot = parsed
            .honeypot_result
            .map(|r| r.is_honeypot)
            .unwrap_or(false);
        let (buy_tax_pct, sell_tax_pct) = parsed
            .simulation_result
            .map(|s| (s.buy_tax, s.sell_tax))
            .unwrap_or((0.0, 0.0));
        let risk_level = if is_honeypot {
            10
        } else if buy_tax_pct.max(sell_tax_pct) > 20.0 {
            8
        } else {
            0
        };

        Ok(Some(HoneypotReport {
            is_honeypot,
            buy_tax_pct,
            sell_tax_pct,
            risk_level,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solana_is_not_eligible_for_honeypot_check() {
        assert_eq!(honeypot_chain_id(ChainId::Sol), None);
    }

    #[test]
    fn evm_chains_map_to_expected_ids() {
        assert_eq!(honeypot_chain_id(ChainId::Eth), Some(1));
        assert_eq!(honeypot_chain_id(ChainId::Bsc), Some(56));
        assert_eq!(honeypot_chain_id(ChainId::Base), Some(8453));
    }
}
