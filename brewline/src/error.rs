//! Error types for checkout payment orchestration.
//!
//! Errors are split by the capability that produces them so that the
//! orchestrator can classify each one as transient (worth retrying) or
//! terminal (surfaced to the caller as-is). The classification lives on
//! [`crate::retry::Retryable`]; the terminal taxonomy the UI layer sees is
//! [`crate::attempt::FailureReason`].

use crate::retry::Retryable;

/// Error produced by a rate source.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RateError {
    /// The rate source could not be reached and no cached value was usable.
    #[error("rate source unavailable: {0}")]
    Unavailable(String),

    /// The rate source answered with something that is not a usable rate.
    #[error("malformed rate response: {0}")]
    Malformed(String),
}

impl Retryable for RateError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Error produced by a ledger read.
///
/// Both variants are classified transient: an unreachable endpoint and a
/// garbled response are equally likely to be gateway trouble, and a
/// read can always be reissued safely.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueryError {
    /// The ledger endpoint could not be reached or answered an error.
    #[error("ledger query unavailable: {0}")]
    Unavailable(String),

    /// The ledger endpoint answered with an undecodable payload.
    #[error("malformed ledger response: {0}")]
    Malformed(String),
}

impl Retryable for QueryError {
    fn is_retryable(&self) -> bool {
        true
    }
}

/// Error produced by the external transaction executor.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutorError {
    /// The executor could not be reached; the operation may be reissued.
    #[error("executor unavailable: {0}")]
    Unavailable(String),

    /// The supplied credentials were missing or rejected.
    #[error("invalid executor credentials: {0}")]
    Credentials(String),

    /// The executor rejected the call descriptor itself.
    #[error("malformed call descriptor: {0}")]
    MalformedCall(String),
}

impl Retryable for ExecutorError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Error produced by amount arithmetic or wire encoding.
///
/// All variants are terminal: an amount that cannot be represented will
/// not become representable by retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    /// The amount exceeds the ledger's representable numeric range.
    #[error("amount exceeds the ledger's representable range")]
    OutOfRange,

    /// Intermediate arithmetic overflowed the working integer width.
    #[error("amount arithmetic overflowed")]
    Overflow,

    /// Negative monetary values are not representable on the ledger.
    #[error("negative amounts are not representable")]
    Negative,
}

impl Retryable for AmountError {
    fn is_retryable(&self) -> bool {
        false
    }
}

/// Error returned by the checkout commit boundary before an attempt runs.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CheckoutError {
    /// An attempt for this session is already in flight; one writer per
    /// session at a time.
    #[error("payment attempt already in flight for session {0}")]
    AttemptInFlight(String),

    /// There is nothing to pay for: the cart is empty or the committed
    /// amount is zero.
    #[error("nothing to pay: empty cart or zero amount")]
    NothingToPay,
}
