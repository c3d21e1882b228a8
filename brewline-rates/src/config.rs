//! Oracle adapter configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::CachedRates;
use crate::http::HttpRateSource;

/// Configuration of the price oracle adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// The rate endpoint.
    pub endpoint: Url,

    /// Per-request timeout, in milliseconds (default: 5000).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// How long a fetched rate is served without refetching, in
    /// milliseconds (default: 30000).
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,

    /// How long a rate may still be served, flagged stale, after a failed
    /// refetch, in milliseconds (default: 300000).
    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_ttl_ms() -> u64 {
    30_000
}

fn default_stale_after_ms() -> u64 {
    300_000
}

impl OracleConfig {
    /// Builds the cached HTTP rate source this configuration describes.
    ///
    /// # Errors
    ///
    /// Returns the underlying client-build error if the HTTP client cannot
    /// be constructed.
    pub fn build(&self) -> Result<CachedRates<HttpRateSource>, reqwest::Error> {
        let source = HttpRateSource::new(
            self.endpoint.clone(),
            Duration::from_millis(self.request_timeout_ms),
        )?;
        Ok(CachedRates::new(
            source,
            Duration::from_millis(self.ttl_ms),
            Duration::from_millis(self.stale_after_ms),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_json() {
        let config: OracleConfig =
            serde_json::from_str(r#"{ "endpoint": "https://rates.example/v1" }"#).unwrap();
        assert_eq!(config.ttl_ms, 30_000);
        assert_eq!(config.stale_after_ms, 300_000);
        assert_eq!(config.request_timeout_ms, 5_000);
    }
}
