//! Rate source contract and quotes.
//!
//! A rate source answers "how many settlement tokens per unit of fiat"
//! for a currency pair. The orchestrator treats a stale quote as usable
//! but carries the staleness flag through to the attempt record so the
//! user-facing layer can surface it.

use std::fmt;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::RateError;

/// An ISO-style fiat currency code, normalized to upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FiatCurrency(String);

impl FiatCurrency {
    /// Creates a currency code, upper-casing the input.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().to_uppercase())
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FiatCurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fiat/token conversion pair, e.g. `EUR/USDm`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RatePair {
    /// Fiat side the cart is priced in.
    pub base: FiatCurrency,
    /// Settlement-token symbol.
    pub quote: String,
}

impl RatePair {
    /// Creates a pair.
    pub fn new(base: FiatCurrency, quote: impl Into<String>) -> Self {
        Self {
            base,
            quote: quote.into(),
        }
    }
}

impl fmt::Display for RatePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// A conversion rate plus its freshness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateQuote {
    /// Tokens per unit of fiat.
    pub rate: Decimal,
    /// Whether the value was served from an expired cache entry after a
    /// fetch failure.
    pub stale: bool,
}

/// A source of fiat/token conversion rates.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Resolves the current rate for `pair`.
    ///
    /// # Errors
    ///
    /// Returns [`RateError::Unavailable`] when no fresh or stale value can
    /// be served, [`RateError::Malformed`] when the source answers with
    /// something that is not a rate.
    async fn rate(&self, pair: &RatePair) -> Result<RateQuote, RateError>;
}
