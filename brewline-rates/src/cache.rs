//! TTL cache with stale-serve fallback.
//!
//! A rate younger than the TTL is served without touching the source.
//! Past the TTL the source is asked again; if it fails, the cached value
//! is served flagged stale for as long as it is younger than the
//! staleness bound. Only when no usable value exists does the failure
//! propagate. The cache lives for one process and is never persisted.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use brewline::error::RateError;
use brewline::oracle::{RatePair, RateQuote, RateSource};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct CachedRate {
    rate: Decimal,
    fetched_at: Instant,
}

/// Caching layer over any [`RateSource`].
#[derive(Debug)]
pub struct CachedRates<S> {
    inner: S,
    ttl: Duration,
    stale_after: Duration,
    cache: RwLock<HashMap<RatePair, CachedRate>>,
}

impl<S> CachedRates<S> {
    /// Wraps `inner` with a TTL and a staleness bound.
    ///
    /// `ttl` is how long a value is served without refetching;
    /// `stale_after` is how long a value may still be served, flagged
    /// stale, after a failed refetch.
    pub fn new(inner: S, ttl: Duration, stale_after: Duration) -> Self {
        Self {
            inner,
            ttl,
            stale_after,
            cache: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<S: RateSource> RateSource for CachedRates<S> {
    async fn rate(&self, pair: &RatePair) -> Result<RateQuote, RateError> {
        let now = Instant::now();
        let cached = self.cache.read().await.get(pair).copied();
        if let Some(entry) = cached {
            if now.duration_since(entry.fetched_at) <= self.ttl {
                return Ok(RateQuote {
                    rate: entry.rate,
                    stale: false,
                });
            }
        }
        match self.inner.rate(pair).await {
            Ok(quote) => {
                self.cache.write().await.insert(
                    pair.clone(),
                    CachedRate {
                        rate: quote.rate,
                        fetched_at: now,
                    },
                );
                Ok(RateQuote {
                    rate: quote.rate,
                    stale: false,
                })
            }
            Err(error) => {
                if let Some(entry) = cached {
                    if now.duration_since(entry.fetched_at) <= self.stale_after {
                        #[cfg(feature = "telemetry")]
                        tracing::warn!(pair = %pair, error = %error, "serving stale rate");
                        return Ok(RateQuote {
                            rate: entry.rate,
                            stale: true,
                        });
                    }
                }
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brewline::oracle::FiatCurrency;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Source that plays back a scripted sequence of answers.
    struct Scripted {
        answers: Mutex<VecDeque<Result<Decimal, RateError>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(answers: Vec<Result<Decimal, RateError>>) -> Self {
            Self {
                answers: Mutex::new(answers.into_iter().collect()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl RateSource for Scripted {
        async fn rate(&self, _pair: &RatePair) -> Result<RateQuote, RateError> {
            *self.calls.lock().unwrap() += 1;
            let answer = self
                .answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(RateError::Unavailable("script over".into())));
            answer.map(|rate| RateQuote { rate, stale: false })
        }
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn pair() -> RatePair {
        RatePair::new(FiatCurrency::new("EUR"), "USDm")
    }

    fn cached(script: Vec<Result<Decimal, RateError>>) -> CachedRates<Scripted> {
        CachedRates::new(
            Scripted::new(script),
            Duration::from_secs(30),
            Duration::from_secs(300),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_value_served_without_refetch() {
        let rates = cached(vec![Ok(dec("1.10"))]);
        assert_eq!(rates.rate(&pair()).await.unwrap().rate, dec("1.10"));
        tokio::time::advance(Duration::from_secs(10)).await;
        let quote = rates.rate(&pair()).await.unwrap();
        assert_eq!(quote.rate, dec("1.10"));
        assert!(!quote.stale);
        assert_eq!(rates.inner.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_value_refetches() {
        let rates = cached(vec![Ok(dec("1.10")), Ok(dec("1.20"))]);
        rates.rate(&pair()).await.unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;
        let quote = rates.rate(&pair()).await.unwrap();
        assert_eq!(quote.rate, dec("1.20"));
        assert!(!quote.stale);
        assert_eq!(rates.inner.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_serves_stale_within_bound() {
        let rates = cached(vec![
            Ok(dec("1.10")),
            Err(RateError::Unavailable("down".into())),
        ]);
        rates.rate(&pair()).await.unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;
        let quote = rates.rate(&pair()).await.unwrap();
        assert_eq!(quote.rate, dec("1.10"));
        assert!(quote.stale);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_past_bound_is_unavailable() {
        let rates = cached(vec![
            Ok(dec("1.10")),
            Err(RateError::Unavailable("down".into())),
        ]);
        rates.rate(&pair()).await.unwrap();
        tokio::time::advance(Duration::from_secs(301)).await;
        let result = rates.rate(&pair()).await;
        assert!(matches!(result, Err(RateError::Unavailable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_cache_failure_propagates() {
        let rates = cached(vec![Err(RateError::Unavailable("down".into()))]);
        let result = rates.rate(&pair()).await;
        assert!(matches!(result, Err(RateError::Unavailable(_))));
    }
}
