// =============================================================================
// Birdeye adapter — Solana-specific trending/token-info source
// =============================================================================

use std::sync::Arc;

use serde::Deserialize;
use tracing::instrument;

use crate::http_fetcher::{FetchError, FetchOptions, HttpFetcher};

pub const SOURCE: &str = "birdeye";

const BASE_URL: &str = "https://public-api.birdeye.so";

#[derive(Debug, Deserialize)]
struct TrendingResponse {
    data: TrendingData,
}

#[derive(Debug, Deserialize)]
struct TrendingData {
    #[serde(default)]
    tokens: Vec<TrendingToken>,
}

#[derive(Debug, Deserialize)]
struct TrendingToken {
    address: String,
    symbol: String,
    #[serde(default)]
    liquidity: f64,
    #[serde(default)]
    price: f64,
}

/// A Solana token surfaced by Birdeye's trending endpoint, used to widen
/// discovery beyond what DexScreener's search turns up for `sol`.
#[derive(Debug, Clone)]
pub struct BirdeyeTrendingToken {
    pub address: String,
    pub symbol: String,
    pub liquidity_usd: f64,
    pub price_usd: f64,
}

pub struct BirdeyeSource {
    fetcher: Arc<HttpFetcher>,
}

impl BirdeyeSource {
    pub fn new(fetcher: Arc<HttpFetcher>) -> Self {
        Self { fetcher }
    }

    #[instrument(skip(self))]
    pub async fn trending(&self) -> Result<Vec<BirdeyeTrendingToken>, FetchError> {
        let url = format!("{BASE_URL}/defi/token_trending?sort_by=rank&sort_type=asc&limit=20");
        let body = self
            .fetcher
            .fetch(SOURCE, &url, FetchOptions::with_timeout(10))
            .await?;
        let parsed: TrendingResponse = serde_json::from_value(body)
            .map_err(|e| FetchError::Decode(SOURCE.to_string(), e.to_string()))?;

        Ok(parsed
            .data
            .tokens
            .into_iter()
            .map(|t| BirdeyeTrendingToken {
                address: t.address,
                symbol: t.symbol,
                liquidity_usd: t.liquidity,
                price_usd: t.price,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trending_response_parses_token_list() {
        let json = serde_json::json!({
            "data": {
                "tokens": [
                    {"address": "Addr1", "symbol": "FOO", "liquidity": 12345.0, "price": 0.01}
                ]
            }
        });
        let parsed: TrendingResponse = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.data.tokens.len(), 1);
        assert_eq!(parsed.data.tokens[0].symbol, "FOO");
    }
}
