//! Two-limb amount encoding for the settlement ledger.
//!
//! The ledger's numeric ABI carries a 128-bit unsigned amount as two
//! 64-bit machine words, low half first. Decomposition is exact: any
//! amount above `u128::MAX` fails fast with [`AmountError::OutOfRange`]
//! instead of truncating.

use alloy_primitives::U256;
use brewline::call::CallArg;
use brewline::error::AmountError;

const LOW_MASK: u128 = u64::MAX as u128;

/// A ledger amount decomposed into its two word limbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireAmount {
    /// Low 64 bits.
    pub low: u64,
    /// High 64 bits.
    pub high: u64,
}

impl WireAmount {
    /// Decomposes `amount` into word limbs.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError::OutOfRange`] when `amount` exceeds the
    /// ledger's 128-bit range.
    pub fn try_from_amount(amount: U256) -> Result<Self, AmountError> {
        let units = u128::try_from(amount).map_err(|_| AmountError::OutOfRange)?;
        let low = u64::try_from(units & LOW_MASK).expect("masked to 64 bits");
        let high = u64::try_from(units >> 64).expect("shifted to 64 bits");
        Ok(Self { low, high })
    }

    /// Recomposes the original amount.
    #[must_use]
    pub fn recompose(&self) -> U256 {
        U256::from((u128::from(self.high) << 64) | u128::from(self.low))
    }

    /// The limbs as call arguments, low word first.
    #[must_use]
    pub const fn words(&self) -> [CallArg; 2] {
        [CallArg::Word(self.low), CallArg::Word(self.high)]
    }
}
