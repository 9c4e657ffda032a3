// =============================================================================
// Upstream source adapters
// =============================================================================
//
// Each submodule wraps exactly one upstream HTTP API behind a small typed
// surface. All of them share the HttpFetcher/RateLimiter plumbing and the
// string-or-number JSON parsing quirk common to these APIs.
// =============================================================================

pub mod birdeye;
pub mod dexscreener;
pub mod exchanges;
pub mod geckoterminal;
pub mod goplus;
pub mod honeypot;
pub mod symbol_directory;

use serde_json::Value;

/// Parse a JSON value that may arrive as either a string or a number.
/// DEX aggregator APIs are notoriously inconsistent about this.
pub(crate) fn parse_str_f64(val: &Value) -> f64 {
    if let Some(s) = val.as_str() {
        s.parse::<f64>().unwrap_or(0.0)
    } else {
        val.as_f64().unwrap_or(0.0)
    }
}

pub(crate) fn parse_str_f64_opt(val: &Value) -> Option<f64> {
    if val.is_null() {
        return None;
    }
    if let Some(s) = val.as_str() {
        s.parse::<f64>().ok()
    } else {
        val.as_f64()
    }
}

pub(crate) fn parse_str_u64(val: &Value) -> u64 {
    if let Some(s) = val.as_str() {
        s.parse::<u64>().unwrap_or(0)
    } else {
        val.as_u64().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_str_f64_accepts_either_representation() {
        assert_eq!(parse_str_f64(&Value::String("12.5".into())), 12.5);
        assert_eq!(parse_str_f64(&Value::from(12.5)), 12.5);
        assert_eq!(parse_str_f64(&Value::Null), 0.0);
    }

    #[test]
    fn parse_str_f64_opt_treats_null_as_none() {
        assert_eq!(parse_str_f64_opt(&Value::Null), None);
        assert_eq!(parse_str_f64_opt(&Value::from(3.0)), Some(3.0));
    }
}
