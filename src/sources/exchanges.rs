// =============================================================================
// Exchange announcement index adapter — raw HTML fetch per monitored venue
// =============================================================================
//
// This module owns exactly one concern: fetching the raw announcement index
// page for each monitored exchange. Parsing lives in `sentinel::parser` per
// spec §4.8/§9 ("isolate behind a single Parser abstraction per exchange").
// =============================================================================

use std::sync::Arc;

use crate::http_fetcher::{FetchError, FetchOptions, HttpFetcher};

/// The exchanges the Sentinel monitors, per spec §4.8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exchange {
    Kucoin,
    Bybit,
    Mexc,
    Gate,
    Lbank,
    Bitmart,
}

impl Exchange {
    pub const ALL: [Exchange; 6] = [
        Self::Kucoin,
        Self::Bybit,
        Self::Mexc,
        Self::Gate,
        Self::Lbank,
        Self::Bitmart,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kucoin => "kucoin",
            Self::Bybit => "bybit",
            Self::Mexc => "mexc",
            Self::Gate => "gate",
            Self::Lbank => "lbank",
            Self::Bitmart => "bitmart",
        }
    }

    /// The announcement index URL for this exchange's "new listings" feed.
    fn announcement_url(&self) -> &'static str {
        match self {
            Self::Kucoin => "https://www.kucoin.com/_api/cms/articles?category=listing&lang=en_US&page=1&pageSize=20",
            Self::Bybit => "https://api.bybit.com/v5/announcements/index?locale=en-US&type=new_crypto&limit=20",
            Self::Mexc => "https://www.mexc.com/api/operation/announcement?page=1&perPage=20&category=newListing",
            Self::Gate => "https://www.gate.io/api2/1/articles?cid=10&page=1&pagesize=20",
            Self::Lbank => "https://www.lbank.com/en-US/support/announcement/new-coin-listings/",
            Self::Bitmart => "https://www.bitmart.com/help-center/en-US/category/new-listings",
        }
    }

    /// Rate limiter / source key this exchange's fetches are billed under.
    pub fn source_key(&self) -> String {
        format!("exchange_{}", self.as_str())
    }
}

pub struct ExchangeAnnouncementSource {
    fetcher: Arc<HttpFetcher>,
}

impl ExchangeAnnouncementSource {
    pub fn new(fetcher: Arc<HttpFetcher>) -> Self {
        Self { fetcher }
    }

    /// Fetch the raw announcement index body (HTML or JSON, depending on the
    /// exchange's public feed) for `exchange`.
    pub async fn fetch_index(&self, exchange: Exchange) -> Result<String, FetchError> {
        let source = exchange.source_key();
        self.fetcher
            .fetch_text(&source, exchange.announcement_url(), FetchOptions::with_timeout(10))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_exchange_has_a_distinct_source_key() {
        let keys: std::collections::HashSet<_> =
            Exchange::ALL.iter().map(|e| e.source_key()).collect();
        assert_eq!(keys.len(), Exchange::ALL.len());
    }

    #[test]
    fn as_str_matches_spec_names() {
        assert_eq!(Exchange::Kucoin.as_str(), "kucoin");
        assert_eq!(Exchange::Bitmart.as_str(), "bitmart");
    }
}
