// =============================================================================
// GoPlus adapter — contract-risk flags and buy/sell tax
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::instrument;

use crate::http_fetcher::{FetchError, FetchOptions, HttpFetcher};
use crate::types::ChainId;

pub const SOURCE: &str = "goplus";

const BASE_URL: &str = "https://api.gopluslabs.io/api/v1";

/// GoPlus chain id codes (their own numbering, distinct from ours).
fn goplus_chain_code(chain: ChainId) -> &'static str {
    match chain {
        ChainId::Eth => "1",
        ChainId::Bsc => "56",
        ChainId::Base => "8453",
        ChainId::Sol => "solana",
    }
}

#[derive(Debug, Deserialize)]
struct TokenSecurityResponse {
    #[serde(default)]
    result: HashMap<String, RawTokenSecurity>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTokenSecurity {
    #[serde(default)]
    is_honeypot: Option<String>,
    #[serde(default)]
    cannot_sell_all: Option<String>,
    #[serde(default)]
    is_true_token: Option<String>,
    #[serde(default)]
    buy_tax: Option<String>,
    #[serde(default)]
    sell_tax: Option<String>,
    #[serde(default)]
    is_proxy: Option<String>,
    #[serde(default)]
    can_take_back_ownership: Option<String>,
    #[serde(default)]
    is_blacklisted: Option<String>,
    #[serde(default)]
    is_mintable: Option<String>,
    #[serde(default)]
    is_anti_whale: Option<String>,
    #[serde(default)]
    trading_cooldown: Option<String>,
    #[serde(default)]
    external_call: Option<String>,
    #[serde(default)]
    gas_abuse: Option<String>,
    #[serde(default)]
    is_airdrop_scam: Option<String>,
}

fn flag_true(opt: &Option<String>) -> bool {
    opt.as_deref() == Some("1")
}

/// Normalized token-security reading, one flag field per spec §4.5 concept.
/// `tax_pct` is `max(buy_tax, sell_tax) * 100`.
#[derive(Debug, Clone, Default)]
pub struct GoPlusReport {
    pub honeypot: bool,
    pub cannot_sell: bool,
    pub fake_token: bool,
    pub tax_pct: f64,
    pub upgradeable: bool,
    pub blacklistable: bool,
    pub mintable: bool,
    pub anti_whale: bool,
    pub trading_cooldown: bool,
    pub external_call: bool,
    pub gas_abuse: bool,
    pub airdrop_scam: bool,
}

impl From<RawTokenSecurity> for GoPlusReport {
    fn from(raw: RawTokenSecurity) -> Self {
        let buy_tax = raw
            .buy_tax
            .as_deref()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(0.0);
        let sell_tax = raw
            .sell_tax
            .as_deref()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(0.0);

        Self {
            honeypot: flag_true(&raw.is_honeypot),
            cannot_sell: flag_true(&raw.cannot_sell_all),
            fake_token: raw.is_true_token.as_deref() == Some("0"),
            tax_pct: buy_tax.max(sell_tax) * 100.0,
            upgradeable: flag_true(&raw.is_proxy) || flag_true(&raw.can_take_back_ownership),
            blacklistable: flag_true(&raw.is_blacklisted),
            mintable: flag_true(&raw.is_mintable),
            anti_whale: flag_true(&raw.is_anti_whale),
            trading_cooldown: flag_true(&raw.trading_cooldown),
            external_call: flag_true(&raw.external_call),
            gas_abuse: flag_true(&raw.gas_abuse),
            airdrop_scam: flag_true(&raw.is_airdrop_scam),
        }
    }
}

pub struct GoPlusSource {
    fetcher: Arc<HttpFetcher>,
}

impl GoPlusSource {
    pub fn new(fetcher: Arc<HttpFetcher>) -> Self {
        Self { fetcher }
    }

    #[instrument(skip(self))]
    pub async fn token_security(
        &self,
        chain: ChainId,
        address: &str,
    ) -> Result<Option<GoPlusReport>, FetchError> {
        let code = goplus_chain_code(chain);
        let url = format!(
            "{BASE_URL}/token_security/{code}?contract_addresses={address}"
        );
        let body = self
            .fetcher
            .fetch(SOURCE, &url, FetchOptions::with_timeout(10))
            .await?;
        let parsed: TokenSecurityResponse = serde_json::from_value(body)
            .map_err(|e| FetchError::Decode(SOURCE.to_string(), e.to_string()))?;

        let key = address.to_ascii_lowercase();
        Ok(parsed
            .result
            .into_iter()
            .find(|(k, _)| k.to_ascii_lowercase() == key)
            .map(|(_, v)| GoPlusReport::from(v)))
    }
}
