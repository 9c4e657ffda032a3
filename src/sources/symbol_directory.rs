// =============================================================================
// Symbol directory adapter — generic symbol → on-chain platform mapping
// =============================================================================
//
// Used by the Sentinel to enrich a detected listing symbol with an on-chain
// address when one is known, so the radar can pin the already-tracked token
// rather than just the bare symbol. Modeled on CoinGecko's public
// `/coins/{id}` platform map, queried by symbol via the public search
// endpoint.
// =============================================================================

use std::sync::Arc;

use serde::Deserialize;
use tracing::instrument;

use crate::http_fetcher::{FetchError, FetchOptions, HttpFetcher};
use crate::types::ChainId;

pub const SOURCE: &str = "symbol_directory";

const BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Priority order used when a symbol maps to more than one platform the
/// radar tracks — earliest match wins, per spec §4.8.
const PLATFORM_PRIORITY: &[(&str, ChainId)] = &[
    ("ethereum", ChainId::Eth),
    ("binance-smart-chain", ChainId::Bsc),
    ("solana", ChainId::Sol),
];

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    coins: Vec<SearchCoin>,
}

#[derive(Debug, Deserialize)]
struct SearchCoin {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CoinResponse {
    #[serde(default)]
    platforms: std::collections::HashMap<String, Option<String>>,
}

/// A resolved on-chain address for a symbol, per the priority platform list.
#[derive(Debug, Clone)]
pub struct ResolvedAddress {
    pub chain_id: ChainId,
    pub address: String,
}

pub struct SymbolDirectorySource {
    fetcher: Arc<HttpFetcher>,
}

impl SymbolDirectorySource {
    pub fn new(fetcher: Arc<HttpFetcher>) -> Self {
        Self { fetcher }
    }

    /// Resolve `symbol` to an on-chain address on the highest-priority chain
    /// the directory lists a contract for. Returns `None` if the symbol is
    /// unknown to the directory or maps to none of our tracked chains.
    #[instrument(skip(self))]
    pub async fn resolve(&self, symbol: &str) -> Result<Option<ResolvedAddress>, FetchError> {
        let search_url = format!("{BASE_URL}/search?query={symbol}");
        let search_body = self
            .fetcher
            .fetch(SOURCE, &search_url, FetchOptions::with_timeout(8))
            .await?;
        let search: SearchResponse = serde_json::from_value(search_body)
            .map_err(|e| FetchError::Decode(SOURCE.to_string(), e.to_string()))?;

        let Some(coin) = search.coins.into_iter().next() else {
            return Ok(None);
        };

        let coin_url = format!("{BASE_URL}/coins/{}", coin.id);
        let coin_body = self
            .fetcher
            .fetch(SOURCE, &coin_url, FetchOptions::with_timeout(8))
            .await?;
        let coin_resp: CoinResponse = serde_json::from_value(coin_body)
            .map_err(|e| FetchError::Decode(SOURCE.to_string(), e.to_string()))?;

        for (platform_key, chain_id) in PLATFORM_PRIORITY {
            if let Some(Some(address)) = coin_resp.platforms.get(*platform_key) {
                if !address.is_empty() {
                    return Ok(Some(ResolvedAddress {
                        chain_id: *chain_id,
                        address: address.clone(),
                    }));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_priority_prefers_ethereum_over_bsc_and_solana() {
        let mut platforms = std::collections::HashMap::new();
        platforms.insert("solana".to_string(), Some("SolAddr".to_string()));
        platforms.insert("ethereum".to_string(), Some("0xEthAddr".to_string()));
        let resp = CoinResponse { platforms };

        let chosen = PLATFORM_PRIORITY.iter().find_map(|(key, chain)| {
            resp.platforms
                .get(*key)
                .and_then(|v| v.clone())
                .filter(|a| !a.is_empty())
                .map(|addr| (*chain, addr))
        });
        assert_eq!(chosen.map(|(c, _)| c), Some(ChainId::Eth));
    }
}
