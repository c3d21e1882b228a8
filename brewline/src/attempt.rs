//! Payment attempts: idempotency tokens, sub-call records, and the state
//! taxonomy of the orchestrator.
//!
//! One [`PaymentAttempt`] is a single run of the orchestrator for one
//! checkout session. Its token is generated once when the buyer commits to
//! pay; re-entering the orchestrator with the same token resumes from the
//! first unconfirmed sub-call instead of reissuing anything.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{B256, hex, keccak256};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::executor::TxHandle;
use crate::oracle::RateQuote;
use crate::session::SessionId;

/// Client-generated idempotency token, unique per committed checkout.
///
/// # Serialization
///
/// Serializes to/from a 32-character lower-case hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttemptToken([u8; 16]);

impl AttemptToken {
    /// Generates a fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        Self(rand::random())
    }

    /// Creates a token from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Derives the replay nonce for one sub-call of this attempt.
    ///
    /// The nonce commits to both the attempt and the call kind, so the
    /// approval and transfer of one attempt are distinct authorizations
    /// while a resubmission of either is an exact replay.
    #[must_use]
    pub fn call_nonce(&self, kind: SubCallKind) -> B256 {
        let mut preimage = [0u8; 17];
        preimage[..16].copy_from_slice(&self.0);
        preimage[16] = kind.tag();
        keccak256(preimage)
    }
}

impl fmt::Display for AttemptToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Error returned when parsing an invalid attempt token string.
#[derive(Debug, thiserror::Error)]
#[error("invalid attempt token {0}")]
pub struct AttemptTokenParseError(String);

impl FromStr for AttemptToken {
    type Err = AttemptTokenParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| AttemptTokenParseError(s.into()))?;
        let bytes: [u8; 16] = bytes
            .try_into()
            .map_err(|_| AttemptTokenParseError(s.into()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for AttemptToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AttemptToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

/// The two sub-calls a payment can issue, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubCallKind {
    /// Allowance grant to the settlement contract.
    Approval,
    /// The token transfer itself.
    Transfer,
}

impl SubCallKind {
    /// Stable byte tag used in nonce derivation.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Approval => 0,
            Self::Transfer => 1,
        }
    }
}

/// Status of one sub-call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubCallStatus {
    /// Submitted, awaiting finality.
    Pending,
    /// Confirmed on the ledger.
    Confirmed,
    /// Reverted or abandoned.
    Failed,
}

/// Record of one issued sub-call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubCall {
    /// Which sub-call this is.
    pub kind: SubCallKind,
    /// Current status.
    pub status: SubCallStatus,
    /// External transaction reference, once submitted.
    pub handle: Option<TxHandle>,
}

/// The network hop an attempt was in when it timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttemptStage {
    /// Fetching the conversion rate.
    Rate,
    /// Reading the wallet balance.
    Balance,
    /// Reading the current allowance.
    Allowance,
    /// Submitting the approval call.
    ApprovalSubmit,
    /// Awaiting approval finality.
    ApprovalConfirm,
    /// Submitting the transfer call.
    TransferSubmit,
    /// Awaiting transfer finality.
    TransferConfirm,
}

/// Why an attempt ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FailureReason {
    /// No usable conversion rate, fresh or cached.
    RateUnavailable,
    /// The wallet balance does not cover the transfer amount. Terminal:
    /// the buyer must act.
    InsufficientBalance,
    /// The amount cannot be encoded for the ledger.
    AmountOutOfRange,
    /// A sub-call executed and reverted on-chain.
    CallReverted,
    /// Retries exhausted or the confirmation deadline passed.
    Timeout {
        /// The hop that gave out.
        stage: AttemptStage,
    },
    /// The buyer cancelled the attempt.
    Cancelled,
    /// The executor rejected the credentials.
    Credentials,
    /// The executor rejected the call descriptor.
    MalformedCall,
}

/// Observable state of a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum AttemptState {
    /// Created, nothing resolved yet.
    Idle,
    /// Conversion rate resolved (or not needed).
    RateResolved {
        /// Whether the rate came from an expired cache entry.
        stale: bool,
    },
    /// Balance verified to cover the amount.
    BalanceChecked,
    /// Approval submitted, awaiting finality.
    ApprovalPending,
    /// Approval confirmed on the ledger.
    ApprovalConfirmed,
    /// Transfer submitted, awaiting finality.
    TransferPending,
    /// Terminal success.
    TransferConfirmed,
    /// Terminal failure.
    Failed {
        /// Why.
        reason: FailureReason,
    },
}

impl AttemptState {
    /// Whether this state ends the attempt.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::TransferConfirmed | Self::Failed { .. })
    }
}

/// A single run of the orchestrator for one checkout session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAttempt {
    /// Idempotency token, generated once per commit.
    pub token: AttemptToken,
    /// The session this attempt pays for.
    pub session: SessionId,
    /// Sub-calls issued so far, in issue order.
    pub calls: Vec<SubCall>,
    /// The rate the amount was resolved with, when conversion ran.
    pub rate: Option<RateQuote>,
    /// Current state.
    pub state: AttemptState,
}

impl PaymentAttempt {
    /// Creates a fresh attempt.
    #[must_use]
    pub const fn new(token: AttemptToken, session: SessionId) -> Self {
        Self {
            token,
            session,
            calls: Vec::new(),
            rate: None,
            state: AttemptState::Idle,
        }
    }

    /// Returns the record of `kind`, if it was issued.
    #[must_use]
    pub fn call(&self, kind: SubCallKind) -> Option<&SubCall> {
        self.calls.iter().find(|c| c.kind == kind)
    }

    /// Whether `kind` has reached confirmation.
    #[must_use]
    pub fn confirmed(&self, kind: SubCallKind) -> bool {
        self.call(kind)
            .is_some_and(|c| c.status == SubCallStatus::Confirmed)
    }

    /// The handle of `kind` if it was submitted but is not yet final.
    #[must_use]
    pub fn pending_handle(&self, kind: SubCallKind) -> Option<TxHandle> {
        self.call(kind)
            .filter(|c| c.status == SubCallStatus::Pending)
            .and_then(|c| c.handle.clone())
    }

    /// Records a submission of `kind`.
    pub fn record_submitted(&mut self, kind: SubCallKind, handle: TxHandle) {
        if let Some(call) = self.calls.iter_mut().find(|c| c.kind == kind) {
            call.status = SubCallStatus::Pending;
            call.handle = Some(handle);
        } else {
            self.calls.push(SubCall {
                kind,
                status: SubCallStatus::Pending,
                handle: Some(handle),
            });
        }
    }

    /// Marks `kind` with a final status.
    pub fn record_final(&mut self, kind: SubCallKind, status: SubCallStatus) {
        if let Some(call) = self.calls.iter_mut().find(|c| c.kind == kind) {
            call.status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_roundtrip() {
        let token = AttemptToken::from_bytes([0xab; 16]);
        let parsed: AttemptToken = token.to_string().parse().unwrap();
        assert_eq!(token, parsed);
    }

    #[test]
    fn test_token_parse_rejects_wrong_length() {
        assert!("abcd".parse::<AttemptToken>().is_err());
    }

    #[test]
    fn test_call_nonce_distinguishes_kinds() {
        let token = AttemptToken::from_bytes([3; 16]);
        assert_ne!(
            token.call_nonce(SubCallKind::Approval),
            token.call_nonce(SubCallKind::Transfer)
        );
        // Deterministic per (token, kind).
        assert_eq!(
            token.call_nonce(SubCallKind::Transfer),
            token.call_nonce(SubCallKind::Transfer)
        );
    }

    #[test]
    fn test_record_submission_then_confirm() {
        let mut attempt =
            PaymentAttempt::new(AttemptToken::generate(), SessionId::new("s1"));
        attempt.record_submitted(SubCallKind::Approval, TxHandle::new("0xaa"));
        assert_eq!(
            attempt.pending_handle(SubCallKind::Approval),
            Some(TxHandle::new("0xaa"))
        );
        attempt.record_final(SubCallKind::Approval, SubCallStatus::Confirmed);
        assert!(attempt.confirmed(SubCallKind::Approval));
        assert_eq!(attempt.pending_handle(SubCallKind::Approval), None);
    }

    #[test]
    fn test_state_terminality() {
        assert!(AttemptState::TransferConfirmed.is_terminal());
        assert!(
            AttemptState::Failed {
                reason: FailureReason::Cancelled
            }
            .is_terminal()
        );
        assert!(!AttemptState::ApprovalPending.is_terminal());
    }
}
