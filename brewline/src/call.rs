//! Ledger-ready call descriptors and the builder contract.
//!
//! A [`CallDescriptor`] is the fully-formed representation of a contract
//! invocation: target, entrypoint, argument words, and a replay nonce.
//! Descriptors are assembled by a [`CallBuilder`] implementation, which is
//! pure and deterministic: the same inputs always produce the same
//! descriptor, so a resubmission after a transient failure is a replay of
//! the same authorization rather than a second payment.

use std::fmt;

use alloy_primitives::{B256, U256};
use serde::{Deserialize, Serialize};

use crate::amount::TokenDeployment;
use crate::error::AmountError;
use crate::ledger::LedgerAddress;

/// Name of a contract entrypoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryPoint(String);

impl EntryPoint {
    /// Creates an entrypoint name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One argument word of a contract call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum CallArg {
    /// An address-sized argument.
    Address(LedgerAddress),
    /// A machine-word argument.
    Word(u64),
}

/// The ledger-ready representation of a contract invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallDescriptor {
    /// Target contract address.
    pub target: LedgerAddress,
    /// Entrypoint to invoke.
    pub entrypoint: EntryPoint,
    /// Argument words in call order.
    pub args: Vec<CallArg>,
    /// 32-byte replay nonce derived from the attempt token and call kind.
    pub nonce: B256,
}

/// Assembles ledger-ready descriptors for the two payment sub-calls.
///
/// Implementations must be pure and deterministic, and must decompose
/// amounts exactly: a value outside the ledger's representable range fails
/// fast with [`AmountError::OutOfRange`], never a silent truncation.
pub trait CallBuilder: Send + Sync {
    /// Builds the approval call granting `spender` the right to move
    /// `amount` base units of `token`.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError`] if `amount` cannot be encoded for the
    /// ledger.
    fn build_approval(
        &self,
        spender: &LedgerAddress,
        amount: U256,
        token: &TokenDeployment,
        nonce: B256,
    ) -> Result<CallDescriptor, AmountError>;

    /// Builds the transfer call moving `amount` base units of `token` to
    /// `recipient`.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError`] if `amount` cannot be encoded for the
    /// ledger.
    fn build_transfer(
        &self,
        recipient: &LedgerAddress,
        amount: U256,
        token: &TokenDeployment,
        nonce: B256,
    ) -> Result<CallDescriptor, AmountError>;
}
