//! The external transaction executor contract.
//!
//! The executor is an opaque capability: it signs a built call with the
//! buyer's custodial wallet, submits it, and reports finality. The
//! orchestrator retries it and reconciles against it, but never
//! implements it. Only test doubles live in this workspace.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::call::CallDescriptor;
use crate::error::ExecutorError;
use crate::ledger::LedgerAddress;

/// Opaque reference to a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHandle(String);

impl TxHandle {
    /// Creates a handle from the executor's reference string.
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Returns the reference as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Finality of a submitted call as the ledger reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TxStatus {
    /// Submitted, not yet final.
    Pending,
    /// Landed and final.
    Confirmed,
    /// Executed and reverted; terminal, never retried.
    Reverted,
}

/// Credentials authorizing the executor to sign for a custodial wallet.
#[derive(Clone)]
pub struct Credentials {
    /// The wallet the executor signs for.
    pub wallet: LedgerAddress,
    /// Opaque session secret for the custodial signer.
    pub secret: String,
}

impl Credentials {
    /// Creates credentials for a wallet.
    pub fn new(wallet: LedgerAddress, secret: impl Into<String>) -> Self {
        Self {
            wallet,
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("wallet", &self.wallet)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Signs and submits built calls; reports their finality.
#[async_trait]
pub trait TransactionExecutor: Send + Sync {
    /// Signs and submits `call`, returning a handle to poll.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::Unavailable`] on transport trouble
    /// (retryable), [`ExecutorError::Credentials`] or
    /// [`ExecutorError::MalformedCall`] on terminal rejection.
    async fn submit(
        &self,
        call: &CallDescriptor,
        credentials: &Credentials,
    ) -> Result<TxHandle, ExecutorError>;

    /// Reports the current finality of a submitted call.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::Unavailable`] when the status cannot be
    /// fetched right now.
    async fn status(&self, handle: &TxHandle) -> Result<TxStatus, ExecutorError>;
}
