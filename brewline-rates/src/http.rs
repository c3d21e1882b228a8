//! HTTP rate source.
//!
//! One GET endpoint, queried as `?base=EUR&quote=USDm`, answering a JSON
//! object with a `rate` member. Shape normalization happens here and
//! nowhere else: the rate may arrive as a JSON string or number, and
//! anything that does not parse into a positive decimal is
//! [`RateError::Malformed`].

use std::time::Duration;

use async_trait::async_trait;
use brewline::error::RateError;
use brewline::oracle::{RatePair, RateQuote, RateSource};
use rust_decimal::Decimal;
use serde_json::Value;
use url::Url;

/// [`RateSource`] backed by a single HTTP read endpoint.
#[derive(Debug, Clone)]
pub struct HttpRateSource {
    client: reqwest::Client,
    endpoint: Url,
}

fn normalize(body: &Value) -> Result<Decimal, RateError> {
    let raw = body
        .get("rate")
        .ok_or_else(|| RateError::Malformed("missing rate member".into()))?;
    let rate: Decimal = match raw {
        Value::String(s) => s
            .parse()
            .map_err(|_| RateError::Malformed(format!("unparseable rate {s}")))?,
        Value::Number(n) => n
            .to_string()
            .parse()
            .map_err(|_| RateError::Malformed(format!("unparseable rate {n}")))?,
        other => return Err(RateError::Malformed(format!("rate is {other}"))),
    };
    if rate <= Decimal::ZERO {
        return Err(RateError::Malformed(format!("non-positive rate {rate}")));
    }
    Ok(rate)
}

impl HttpRateSource {
    /// Creates a source against `endpoint` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns the underlying client-build error if the HTTP client cannot
    /// be constructed.
    pub fn new(endpoint: Url, request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl RateSource for HttpRateSource {
    async fn rate(&self, pair: &RatePair) -> Result<RateQuote, RateError> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[("base", pair.base.as_str()), ("quote", pair.quote.as_str())])
            .send()
            .await
            .map_err(|e| RateError::Unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| RateError::Unavailable(e.to_string()))?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| RateError::Malformed(e.to_string()))?;
        let rate = normalize(&body)?;
        #[cfg(feature = "telemetry")]
        tracing::debug!(pair = %pair, %rate, "rate fetched");
        Ok(RateQuote { rate, stale: false })
    }
}
