// =============================================================================
// DexScreener adapter — primary pair search & snapshot source
// =============================================================================

use std::sync::Arc;

use serde::Deserialize;
use tracing::instrument;

use crate::http_fetcher::{FetchError, FetchOptions, HttpFetcher};

use super::{parse_str_f64, parse_str_f64_opt};

pub const SOURCE: &str = "dexscreener";

const BASE_URL: &str = "https://api.dexscreener.com";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    pairs: Vec<RawPair>,
}

#[derive(Debug, Deserialize)]
struct PairResponse {
    #[serde(default)]
    pairs: Option<Vec<RawPair>>,
    #[serde(default)]
    pair: Option<RawPair>,
}

#[derive(Debug, Deserialize)]
struct RawPair {
    #[serde(rename = "chainId")]
    chain_id: String,
    #[serde(rename = "pairAddress")]
    pair_address: String,
    #[serde(rename = "baseToken")]
    base_token: RawToken,
    #[serde(default, rename = "priceUsd")]
    price_usd: Option<serde_json::Value>,
    #[serde(default)]
    txns: RawTxns,
    #[serde(default)]
    volume: RawVolume,
    #[serde(default, rename = "priceChange")]
    price_change: RawPriceChange,
    #[serde(default)]
    liquidity: RawLiquidity,
    #[serde(default)]
    fdv: Option<serde_json::Value>,
    #[serde(default, rename = "pairCreatedAt")]
    pair_created_at: Option<i64>,
    #[serde(default)]
    boosts: Option<RawBoosts>,
}

#[derive(Debug, Deserialize)]
struct RawToken {
    address: String,
    name: String,
    symbol: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawTxns {
    #[serde(default)]
    m5: RawTxnCount,
}

#[derive(Debug, Default, Deserialize)]
struct RawTxnCount {
    #[serde(default)]
    buys: u64,
    #[serde(default)]
    sells: u64,
}

#[derive(Debug, Default, Deserialize)]
struct RawVolume {
    #[serde(default)]
    m5: Option<serde_json::Value>,
    #[serde(default)]
    m15: Option<serde_json::Value>,
    #[serde(default)]
    h24: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPriceChange {
    #[serde(default)]
    m5: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLiquidity {
    #[serde(default)]
    usd: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawBoosts {
    #[serde(default)]
    active: u32,
}

/// Normalized pair snapshot as extracted from a DexScreener response. `vol_15`
/// is `None` when the upstream omitted the field — callers fall back to
/// synthesizing it from `vol_5` only at emit time, never here.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DexPair {
    pub chain_id: String,
    pub pair_address: String,
    pub base_address: String,
    pub base_name: String,
    pub base_symbol: String,
    pub price_usd: f64,
    pub buys_5: u64,
    pub sells_5: u64,
    pub vol_5_usd: f64,
    pub vol_15_usd: Option<f64>,
    pub vol_24h_usd: Option<f64>,
    pub price_change_5m: f64,
    pub liquidity_usd: f64,
    pub fdv_usd: Option<f64>,
    pub pair_created_at: i64,
    pub boosts_active: u32,
}

impl From<RawPair> for DexPair {
    fn from(raw: RawPair) -> Self {
        Self {
            chain_id: raw.chain_id,
            pair_address: raw.pair_address,
            base_address: raw.base_token.address,
            base_name: raw.base_token.name,
            base_symbol: raw.base_token.symbol,
            price_usd: raw
                .price_usd
                .as_ref()
                .map(parse_str_f64)
                .unwrap_or(0.0),
            buys_5: raw.txns.m5.buys,
            sells_5: raw.txns.m5.sells,
            vol_5_usd: raw.volume.m5.as_ref().map(parse_str_f64).unwrap_or(0.0),
            vol_15_usd: raw.volume.m15.as_ref().and_then(parse_str_f64_opt),
            vol_24h_usd: raw.volume.h24.as_ref().and_then(parse_str_f64_opt),
            price_change_5m: raw
                .price_change
                .m5
                .as_ref()
                .map(parse_str_f64)
                .unwrap_or(0.0),
            liquidity_usd: raw.liquidity.usd.as_ref().map(parse_str_f64).unwrap_or(0.0),
            fdv_usd: raw.fdv.as_ref().and_then(parse_str_f64_opt),
            pair_created_at: raw.pair_created_at.map(|ms| ms / 1000).unwrap_or(0),
            boosts_active: raw.boosts.map(|b| b.active).unwrap_or(0),
        }
    }
}

pub struct DexScreenerSource {
    fetcher: Arc<HttpFetcher>,
}

impl DexScreenerSource {
    pub fn new(fetcher: Arc<HttpFetcher>) -> Self {
        Self { fetcher }
    }

    /// Search pairs matching `query` (a quote symbol or "trending"-style
    /// keyword), returning candidates across all chains the query surfaces.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> Result<Vec<DexPair>, FetchError> {
        let url = format!("{BASE_URL}/latest/dex/search?q={query}");
        let body = self
            .fetcher
            .fetch(SOURCE, &url, FetchOptions::with_timeout(10))
            .await?;
        let parsed: SearchResponse = serde_json::from_value(body)
            .map_err(|e| FetchError::Decode(SOURCE.to_string(), e.to_string()))?;
        Ok(parsed.pairs.into_iter().map(DexPair::from).collect())
    }

    /// Fetch the current snapshot for a single pair.
    #[instrument(skip(self))]
    pub async fn pair_snapshot(
        &self,
        chain_id: &str,
        pair_address: &str,
    ) -> Result<Option<DexPair>, FetchError> {
        let url = format!("{BASE_URL}/latest/dex/pairs/{chain_id}/{pair_address}");
        let body = self
            .fetcher
            .fetch(SOURCE, &url, FetchOptions::with_timeout(8))
            .await?;
        let parsed: PairResponse = serde_json::from_value(body)
            .map_err(|e| FetchError::Decode(SOURCE.to_string(), e.to_string()))?;

        if let Some(p) = parsed.pair {
            return Ok(Some(DexPair::from(p)));
        }
        Ok(parsed
            .pairs
            .and_then(|mut v| if v.is_empty() { None } else { Some(v.remove(0)) })
            .map(DexPair::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_pair_deserializes_string_and_number_fields() {
        let json = serde_json::json!({
            "chainId": "solana",
            "pairAddress": "Pair1",
            "baseToken": {"address": "Addr1", "name": "Foo", "symbol": "FOO"},
            "priceUsd": "0.00123",
            "txns": {"m5": {"buys": 10, "sells": 4}},
            "volume": {"m5": "1500.5", "m15": 4200.0},
            "priceChange": {"m5": "3.2"},
            "liquidity": {"usd": 25000.0},
            "fdv": "1000000",
            "pairCreatedAt": 1_700_000_000_000i64,
            "boosts": {"active": 2}
        });
        let raw: RawPair = serde_json::from_value(json).unwrap();
        let pair: DexPair = raw.into();
        assert_eq!(pair.price_usd, 0.00123);
        assert_eq!(pair.buys_5, 10);
        assert_eq!(pair.vol_5_usd, 1500.5);
        assert_eq!(pair.vol_15_usd, Some(4200.0));
        assert_eq!(pair.pair_created_at, 1_700_000_000);
        assert_eq!(pair.boosts_active, 2);
    }

    #[test]
    fn missing_m15_volume_surfaces_as_none() {
        let json = serde_json::json!({
            "chainId": "solana",
            "pairAddress": "Pair1",
            "baseToken": {"address": "Addr1", "name": "Foo", "symbol": "FOO"},
            "volume": {"m5": "100"}
        });
        let raw: RawPair = serde_json::from_value(json).unwrap();
        let pair: DexPair = raw.into();
        assert_eq!(pair.vol_15_usd, None);
    }
}
