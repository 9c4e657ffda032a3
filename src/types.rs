// =============================================================================
// Shared types used across the memecoin radar pipeline
// =============================================================================

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// The blockchains the radar discovers and polls pairs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainId {
    Sol,
    Eth,
    Bsc,
    Base,
}

impl ChainId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sol => "sol",
            Self::Eth => "eth",
            Self::Bsc => "bsc",
            Self::Base => "base",
        }
    }

    /// Whether this chain is EVM-compatible (gates honeypot-simulation checks).
    pub fn is_evm(&self) -> bool {
        !matches!(self, Self::Sol)
    }

    /// Quote symbols searched during discovery for this chain.
    pub fn discovery_quotes(&self) -> &'static [&'static str] {
        match self {
            Self::Sol => &["SOL", "USDC", "USDT"],
            Self::Eth => &["WETH", "USDC", "USDT"],
            Self::Bsc => &["WBNB", "USDT", "BUSD"],
            Self::Base => &["WETH", "USDC"],
        }
    }

    /// The chain-id slug DexScreener uses in its `chainId` field and pair
    /// snapshot URL path.
    pub fn dex_chain_slug(&self) -> &'static str {
        match self {
            Self::Sol => "solana",
            Self::Eth => "ethereum",
            Self::Bsc => "bsc",
            Self::Base => "base",
        }
    }

    /// Whether a DexScreener-reported `chainId` string refers to this chain.
    pub fn matches_dex_chain_str(&self, s: &str) -> bool {
        s.eq_ignore_ascii_case(self.dex_chain_slug())
    }
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ChainId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sol" => Ok(Self::Sol),
            "eth" => Ok(Self::Eth),
            "bsc" => Ok(Self::Bsc),
            "base" => Ok(Self::Base),
            other => Err(format!("unknown chain id: {other}")),
        }
    }
}

/// A reference to a token: its chain, address, symbol and display name.
/// Equality is `(chain_id, address)`, case-preserving.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRef {
    pub chain_id: ChainId,
    pub address: String,
    pub symbol: String,
    pub name: String,
}

impl PartialEq for TokenRef {
    fn eq(&self, other: &Self) -> bool {
        self.chain_id == other.chain_id && self.address == other.address
    }
}
impl Eq for TokenRef {}

/// Raw per-pair statistics as normalised from an upstream snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PairStats {
    pub buys_5: u64,
    pub sells_5: u64,
    pub vol_5_usd: f64,
    pub vol_15_usd: f64,
    /// `None` when the upstream omitted 24h volume; the Scorer's turnover
    /// term is simply skipped in that case rather than assuming zero.
    pub vol_24h_usd: Option<f64>,
    pub price_usd: f64,
    pub price_change_5m: f64,
    pub liquidity_usd: f64,
    pub fdv_usd: Option<f64>,
    /// Unix seconds the pair was created.
    pub pair_created_at: i64,
}

/// A single refreshed pair snapshot, emitted by the DataCollector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairUpdate {
    pub chain_id: ChainId,
    pub pair_address: String,
    pub token: TokenRef,
    pub stats: PairStats,
    pub boosts_active: u32,
    /// Unix millis, producer clock.
    pub ts: i64,
}

impl PairUpdate {
    /// Composite key used for dedup, ordering and baseline lookup.
    pub fn key(&self) -> (ChainId, String) {
        (self.chain_id, self.token.address.clone())
    }

    pub fn age_minutes(&self, now_secs: i64) -> f64 {
        ((now_secs - self.stats.pair_created_at).max(0) as f64) / 60.0
    }
}

/// Per-token security audit result, merged across upstreams and cached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecurityReport {
    pub address: String,
    pub security_ok: bool,
    pub penalty: f64,
    pub flags: BTreeSet<String>,
    pub sources: BTreeSet<String>,
}

impl SecurityReport {
    /// The degraded report returned when analysis itself fails.
    pub fn degraded(address: impl Into<String>) -> Self {
        let mut flags = BTreeSet::new();
        flags.insert("analysis_failed".to_string());
        Self {
            address: address.into(),
            security_ok: false,
            penalty: 50.0,
            flags,
            sources: BTreeSet::new(),
        }
    }
}

/// The computed, per-token scoring signals (pre-weighting).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct Signals {
    pub imbalance5: f64,
    pub surge15: f64,
    pub price_accel: f64,
    pub liquidity_quality: f64,
    pub age_factor: f64,
    pub security_penalty: f64,
    pub listing_boost: f64,
}

/// A link bundle attached to a TokenSummary for client convenience.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenLinks {
    pub dexscreener: String,
    pub chart: String,
}

/// Security summary embedded in a TokenSummary (ok flag + flags only, no
/// numeric penalty — callers that need the full report use SecurityAuditor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySummary {
    pub ok: bool,
    pub flags: BTreeSet<String>,
}

/// The fully scored, client-facing view of a token/pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSummary {
    pub chain_id: ChainId,
    pub token: TokenRef,
    pub pair_address: String,
    pub price_usd: f64,
    pub buys_5: u64,
    pub sells_5: u64,
    pub vol_5_usd: f64,
    pub vol_15_usd: f64,
    pub liquidity_usd: f64,
    pub fdv_usd: Option<f64>,
    pub age_minutes: f64,
    pub score: f64,
    pub reasons: Vec<String>,
    pub security: SecuritySummary,
    pub links: TokenLinks,
}

impl TokenSummary {
    pub fn address(&self) -> &str {
        &self.token.address
    }
}

/// The leaderboard categories the Scorer buckets eligible tokens into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardCategory {
    NewMints,
    Momentum5m,
    Continuation15m,
    UnusualVolume,
}

impl LeaderboardCategory {
    pub const ALL: [LeaderboardCategory; 4] = [
        Self::NewMints,
        Self::Momentum5m,
        Self::Continuation15m,
        Self::UnusualVolume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewMints => "new_mints",
            Self::Momentum5m => "momentum_5m",
            Self::Continuation15m => "continuation_15m",
            Self::UnusualVolume => "unusual_volume",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new_mints" => Some(Self::NewMints),
            "momentum_5m" => Some(Self::Momentum5m),
            "continuation_15m" => Some(Self::Continuation15m),
            "unusual_volume" => Some(Self::UnusualVolume),
            _ => None,
        }
    }
}

/// Token identification carried in a CEXListingEvent — looser than TokenRef
/// because the address may not be known at detection time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingTokenRef {
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<ChainId>,
}

/// Whether a Sentinel-detected listing was matched to an on-chain address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingConfirmation {
    Address,
    SymbolOnly,
}

/// A detected CEX listing/announcement event, emitted by the Sentinel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CexListingEvent {
    pub source: String,
    pub exchange: String,
    pub markets: Vec<String>,
    pub urls: Vec<String>,
    pub token: ListingTokenRef,
    pub confirmation: ListingConfirmation,
    pub radar_score: f64,
    pub liquidity_usd: f64,
    /// Unix millis — the announcement's publish time.
    pub ts: i64,
}

/// A token kept visible in the hotlist regardless of filters, for a window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinnedToken {
    pub summary: TokenSummary,
    /// Unix millis when the pin expires.
    pub pinned_until: i64,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_id_round_trips_through_str() {
        for c in [ChainId::Sol, ChainId::Eth, ChainId::Bsc, ChainId::Base] {
            let s = c.to_string();
            let parsed: ChainId = s.parse().unwrap();
            assert_eq!(c, parsed);
        }
    }

    #[test]
    fn only_sol_is_non_evm() {
        assert!(!ChainId::Sol.is_evm());
        assert!(ChainId::Eth.is_evm());
        assert!(ChainId::Bsc.is_evm());
        assert!(ChainId::Base.is_evm());
    }

    #[test]
    fn token_ref_equality_ignores_symbol_and_name() {
        let a = TokenRef {
            chain_id: ChainId::Sol,
            address: "Addr1".into(),
            symbol: "FOO".into(),
            name: "Foo Coin".into(),
        };
        let b = TokenRef {
            chain_id: ChainId::Sol,
            address: "Addr1".into(),
            symbol: "BAR".into(),
            name: "Bar".into(),
        };
        assert_eq!(a, b);
    }

    #[test]
    fn leaderboard_category_parses_its_own_as_str() {
        for cat in LeaderboardCategory::ALL {
            assert_eq!(LeaderboardCategory::parse(cat.as_str()), Some(cat));
        }
        assert_eq!(LeaderboardCategory::parse("not_a_category"), None);
    }
}
