// =============================================================================
// HTTP Fetcher — rate-limit-aware, instrumented upstream request wrapper
// =============================================================================
//
// Every upstream source call goes through here. The fetcher consults the
// shared RateLimiter before issuing a request; if no token is available it
// fails fast with `FetchError::RateLimited` rather than queueing (callers
// back off and retry on their own schedule).
// =============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::rate_limiter::RateLimiter;

/// Failure modes a caller may want to branch on (e.g. rate-limited sources
/// should back off without counting toward a failure budget).
#[derive(Debug, Clone)]
pub enum FetchError {
    RateLimited(String),
    Timeout(String, Duration),
    Http4xx(String, u16),
    Http5xx(String, u16),
    Network(String, String),
    Decode(String, String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited(s) => write!(f, "rate limited locally, no token for source '{s}'"),
            Self::Timeout(s, d) => write!(f, "request to '{s}' timed out after {d:?}"),
            Self::Http4xx(s, code) => write!(f, "'{s}' returned client error {code}"),
            Self::Http5xx(s, code) => write!(f, "'{s}' returned server error {code}"),
            Self::Network(s, e) => write!(f, "network error calling '{s}': {e}"),
            Self::Decode(s, e) => write!(f, "failed to parse JSON body from '{s}': {e}"),
        }
    }
}

impl std::error::Error for FetchError {}

/// Per-call options. Defaults are chosen per the upstream's typical latency.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(8),
        }
    }
}

impl FetchOptions {
    pub fn with_timeout(secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(secs),
        }
    }
}

/// Shared HTTP fetcher wired to a single `reqwest::Client` and `RateLimiter`.
pub struct HttpFetcher {
    client: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
}

impl HttpFetcher {
    pub fn new(rate_limiter: Arc<RateLimiter>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("memepulse-radar/1.0")
            .build()
            .expect("failed to build reqwest client");

        Self {
            client,
            rate_limiter,
        }
    }

    /// Fetch `url` on behalf of `source`, returning the parsed JSON body.
    #[instrument(skip(self, options), fields(source, url))]
    pub async fn fetch(
        &self,
        source: &str,
        url: &str,
        options: FetchOptions,
    ) -> Result<Value, FetchError> {
        let (status, resp) = self.send(source, url, &options).await?;
        let started = Instant::now();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| FetchError::Decode(source.to_string(), e.to_string()))?;

        debug!(
            source,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fetch ok"
        );

        Ok(body)
    }

    /// Fetch `url` as raw text, for upstreams that return HTML rather than
    /// JSON (Sentinel's exchange announcement index pages).
    #[instrument(skip(self, options), fields(source, url))]
    pub async fn fetch_text(
        &self,
        source: &str,
        url: &str,
        options: FetchOptions,
    ) -> Result<String, FetchError> {
        let (_status, resp) = self.send(source, url, &options).await?;
        resp.text()
            .await
            .map_err(|e| FetchError::Decode(source.to_string(), e.to_string()))
    }

    /// Shared request/status-classification path for `fetch`/`fetch_text`.
    async fn send(
        &self,
        source: &str,
        url: &str,
        options: &FetchOptions,
    ) -> Result<(StatusCode, reqwest::Response), FetchError> {
        if !self.rate_limiter.can_make_request(source) {
            return Err(FetchError::RateLimited(source.to_string()));
        }

        let resp = self
            .client
            .get(url)
            .timeout(options.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(source.to_string(), options.timeout)
                } else {
                    FetchError::Network(source.to_string(), e.to_string())
                }
            })?;

        let status = resp.status();
        let retry_after = resp
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);

        if status == StatusCode::TOO_MANY_REQUESTS {
            self.rate_limiter.observe_429(source, retry_after);
            return Err(FetchError::Http4xx(source.to_string(), status.as_u16()));
        }

        if status.is_client_error() {
            warn!(source, status = status.as_u16(), "upstream client error");
            return Err(FetchError::Http4xx(source.to_string(), status.as_u16()));
        }

        if status.is_server_error() {
            warn!(source, status = status.as_u16(), "upstream server error");
            return Err(FetchError::Http5xx(source.to_string(), status.as_u16()));
        }

        Ok((status, resp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(Arc::new(RateLimiter::new()))
    }

    #[test]
    fn default_options_uses_eight_second_timeout() {
        let opts = FetchOptions::default();
        assert_eq!(opts.timeout, Duration::from_secs(8));
    }

    #[test]
    fn with_timeout_overrides_default() {
        let opts = FetchOptions::with_timeout(15);
        assert_eq!(opts.timeout, Duration::from_secs(15));
    }

    #[tokio::test]
    async fn rate_limited_source_fails_fast_without_network_call() {
        let rl = Arc::new(RateLimiter::new());
        // Drain the dexscreener bucket's burst capacity then force a 429 so
        // the next call fails purely on the local limiter.
        rl.observe_429("dexscreener", Some(Duration::from_secs(60)));
        let fetcher = HttpFetcher::new(rl);
        let err = fetcher
            .fetch("dexscreener", "http://127.0.0.1:0/unused", FetchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::RateLimited(_)));
    }

    #[tokio::test]
    async fn network_error_on_unreachable_host_is_classified() {
        let fetcher = fetcher();
        let err = fetcher
            .fetch(
                "testsource",
                "http://127.0.0.1:1/unreachable",
                FetchOptions::with_timeout(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FetchError::Network(_, _) | FetchError::Timeout(_, _)
        ));
    }
}
