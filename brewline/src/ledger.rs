//! Ledger addresses and the read-only query contract.
//!
//! Balance and allowance are always read fresh immediately before use and
//! never cached across orchestrator steps: the orchestration exists to
//! react to their current value after a preceding approval call lands.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::error::QueryError;

/// A 32-byte account or contract address on the settlement ledger.
///
/// # Serialization
///
/// Serializes to/from a `0x`-prefixed hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LedgerAddress(B256);

impl LedgerAddress {
    /// Creates an address from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(B256::new(bytes))
    }

    /// Returns the raw address bytes.
    #[must_use]
    pub const fn to_bytes(self) -> [u8; 32] {
        self.0.0
    }
}

impl From<B256> for LedgerAddress {
    fn from(value: B256) -> Self {
        Self(value)
    }
}

impl fmt::Display for LedgerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when parsing an invalid ledger address string.
#[derive(Debug, thiserror::Error)]
#[error("invalid ledger address {0}")]
pub struct LedgerAddressParseError(String);

impl FromStr for LedgerAddress {
    type Err = LedgerAddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<B256>()
            .map(Self)
            .map_err(|_| LedgerAddressParseError(s.into()))
    }
}

impl Serialize for LedgerAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for LedgerAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

/// Read-only queries against the external ledger.
///
/// Implementations answer with current on-chain values; callers must not
/// cache results across steps. Transport trouble surfaces as
/// [`QueryError`], a retryable condition, as opposed to a
/// confirmed on-chain shortfall, which is a business-rule failure decided
/// by the orchestrator.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// Returns the token balance of `wallet` in base units.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] if the ledger cannot be queried.
    async fn balance(
        &self,
        wallet: &LedgerAddress,
        token: &LedgerAddress,
    ) -> Result<U256, QueryError>;

    /// Returns the amount `spender` is currently approved to move on
    /// behalf of `owner`, in base units.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] if the ledger cannot be queried.
    async fn allowance(
        &self,
        owner: &LedgerAddress,
        spender: &LedgerAddress,
        token: &LedgerAddress,
    ) -> Result<U256, QueryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_roundtrip() {
        let addr = LedgerAddress::from_bytes([7u8; 32]);
        let serialized = serde_json::to_string(&addr).unwrap();
        let deserialized: LedgerAddress = serde_json::from_str(&serialized).unwrap();
        assert_eq!(addr, deserialized);
    }

    #[test]
    fn test_address_display_is_prefixed_hex() {
        let addr = LedgerAddress::from_bytes([0u8; 32]);
        let s = addr.to_string();
        assert!(s.starts_with("0x"));
        assert_eq!(s.len(), 2 + 64);
    }

    #[test]
    fn test_address_parse_rejects_garbage() {
        assert!("not-an-address".parse::<LedgerAddress>().is_err());
        assert!("0x1234".parse::<LedgerAddress>().is_err());
    }
}
