#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Checkout payment orchestration for blockchain-settled marketplaces.
//!
//! This crate is the chain-agnostic core of brewline. It owns the domain
//! types of a checkout (cart, session, amounts) and the payment state
//! machine that drives a committed checkout through currency conversion,
//! allowance management, and token transfer without ever double-charging.
//!
//! Chain-facing capabilities are consumed through traits and provided by
//! sibling crates (or by the embedding application):
//!
//! - [`oracle::RateSource`] - fiat/token conversion rates
//! - [`ledger::LedgerReader`] - fresh balance and allowance reads
//! - [`call::CallBuilder`] - deterministic call descriptor assembly
//! - [`executor::TransactionExecutor`] - opaque signing and submission
//!
//! # Modules
//!
//! - [`amount`] - Integer token amounts and fiat conversion
//! - [`attempt`] - Payment attempts, idempotency tokens, state taxonomy
//! - [`call`] - Call descriptors and the builder trait
//! - [`cart`] - Session-scoped cart store with a persistence port
//! - [`config`] - Orchestrator and retry configuration
//! - [`error`] - Error types, split by concern
//! - [`executor`] - The external transaction executor contract
//! - [`ledger`] - Ledger addresses and the read-only query trait
//! - [`oracle`] - Rate source trait and quotes
//! - [`orchestrator`] - The checkout payment state machine
//! - [`retry`] - Bounded retry with backoff, timeout, and cancellation
//! - [`session`] - Checkout step and delivery state
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod amount;
pub mod attempt;
pub mod call;
pub mod cart;
pub mod config;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod oracle;
pub mod orchestrator;
pub mod retry;
pub mod session;
