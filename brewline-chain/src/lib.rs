#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Ledger-facing adapters for brewline.
//!
//! The settlement ledger encodes wide integers as pairs of 64-bit machine
//! words. This crate owns that encoding and everything built on it:
//!
//! - [`wire`] - Two-limb amount encoding with exact round-trips
//! - [`builder`] - The marketplace call builder (approve / settle)
//! - [`reader`] - JSON-RPC balance and allowance reads
//! - [`tokens`] - Registry of known settlement-token deployments
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod builder;
pub mod reader;
pub mod tokens;
pub mod wire;
