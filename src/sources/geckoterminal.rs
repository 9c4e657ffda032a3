// =============================================================================
// GeckoTerminal adapter — secondary discovery source & OHLC endpoint
// =============================================================================

use std::sync::Arc;

use serde::Deserialize;
use tracing::instrument;

use crate::http_fetcher::{FetchError, FetchOptions, HttpFetcher};

use super::parse_str_f64_opt;

pub const SOURCE: &str = "geckoterminal";

const BASE_URL: &str = "https://api.geckoterminal.com/api/v2";

/// Maps a radar ChainId to GeckoTerminal's network slug.
pub fn network_slug(chain: &str) -> &'static str {
    match chain {
        "sol" => "solana",
        "eth" => "eth",
        "bsc" => "bsc",
        "base" => "base",
        _ => "solana",
    }
}

#[derive(Debug, Deserialize)]
struct PoolsResponse {
    #[serde(default)]
    data: Vec<PoolEntry>,
}

#[derive(Debug, Deserialize)]
struct PoolEntry {
    attributes: PoolAttributes,
}

#[derive(Debug, Deserialize)]
struct PoolAttributes {
    address: String,
    #[serde(default, rename = "base_token_price_usd")]
    base_token_price_usd: Option<serde_json::Value>,
    #[serde(default, rename = "reserve_in_usd")]
    reserve_in_usd: Option<serde_json::Value>,
    #[serde(default, rename = "pool_created_at")]
    pool_created_at: Option<String>,
}

/// Minimal trending-pool candidate used only to seed discovery when
/// DexScreener's search turns up nothing for a quote keyword.
#[derive(Debug, Clone)]
pub struct TrendingPool {
    pub pool_address: String,
    pub price_usd: f64,
    pub liquidity_usd: f64,
    pub created_at_unix: i64,
}

pub struct GeckoTerminalSource {
    fetcher: Arc<HttpFetcher>,
}

impl GeckoTerminalSource {
    pub fn new(fetcher: Arc<HttpFetcher>) -> Self {
        Self { fetcher }
    }

    #[instrument(skip(self))]
    pub async fn trending_pools(&self, chain: &str) -> Result<Vec<TrendingPool>, FetchError> {
        let network = network_slug(chain);
        let url = format!("{BASE_URL}/networks/{network}/trending_pools");
        let body = self
            .fetcher
            .fetch(SOURCE, &url, FetchOptions::with_timeout(10))
            .await?;
        let parsed: PoolsResponse = serde_json::from_value(body)
            .map_err(|e| FetchError::Decode(SOURCE.to_string(), e.to_string()))?;

        Ok(parsed
            .data
            .into_iter()
            .map(|entry| {
                let a = entry.attributes;
                let created_at_unix = a
                    .pool_created_at
                    .as_deref()
                    .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.timestamp())
                    .unwrap_or(0);
                TrendingPool {
                    pool_address: a.address,
                    price_usd: a
                        .base_token_price_usd
                        .as_ref()
                        .and_then(parse_str_f64_opt)
                        .unwrap_or(0.0),
                    liquidity_usd: a
                        .reserve_in_usd
                        .as_ref()
                        .and_then(parse_str_f64_opt)
                        .unwrap_or(0.0),
                    created_at_unix,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_slug_maps_known_chains() {
        assert_eq!(network_slug("sol"), "solana");
        assert_eq!(network_slug("eth"), "eth");
        assert_eq!(network_slug("bsc"), "bsc");
        assert_eq!(network_slug("base"), "base");
    }

    #[test]
    fn unknown_chain_falls_back_to_solana() {
        assert_eq!(network_slug("nope"), "solana");
    }
}
