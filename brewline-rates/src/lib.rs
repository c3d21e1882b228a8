#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Price oracle adapter for brewline.
//!
//! Implements [`brewline::oracle::RateSource`] in two layers:
//!
//! - [`http::HttpRateSource`] - fetches a fiat/token rate from a single
//!   read endpoint, normalizing whatever shape the source answers with
//! - [`cache::CachedRates`] - serves fresh values from a short-TTL cache
//!   and falls back to a stale cached value, flagged as such, when the
//!   source is down
//!
//! [`config::OracleConfig`] wires both up from configuration.
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod cache;
pub mod config;
pub mod http;
