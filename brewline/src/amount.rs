//! Integer token amounts and fiat conversion.
//!
//! All monetary arithmetic happens on unsigned 256-bit integers; fixed
//! decimal precision exists only at the display and serialization
//! boundary. Fiat prices and oracle rates arrive as [`Decimal`] values and
//! are converted by multiplying their integer mantissas, never through
//! floating point.

use std::fmt;

use alloy_primitives::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AmountError;
use crate::ledger::LedgerAddress;

/// A settlement-token deployment: its symbol, contract address, and the
/// decimal precision its base units carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDeployment {
    /// Ticker symbol (e.g. `"USDm"`).
    pub symbol: String,
    /// Token contract address on the settlement ledger.
    pub address: LedgerAddress,
    /// Number of decimals in one whole token.
    pub decimals: u8,
}

/// A token value in base units, tagged with its decimal precision.
///
/// The precision is used only when rendering or parsing human-readable
/// values; comparisons and arithmetic operate on the raw [`U256`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAmount {
    value: U256,
    decimals: u8,
}

/// `10^exp`, or [`AmountError::Overflow`] when it does not fit in 256 bits.
fn pow10(exp: u32) -> Result<U256, AmountError> {
    U256::from(10u64)
        .checked_pow(U256::from(exp))
        .ok_or(AmountError::Overflow)
}

impl TokenAmount {
    /// Creates an amount from raw base units.
    #[must_use]
    pub const fn from_base_units(value: U256, decimals: u8) -> Self {
        Self { value, decimals }
    }

    /// Converts a fiat total into token base units using an exchange rate.
    ///
    /// The computation multiplies the decimal mantissas of `total` and
    /// `rate` as integers and rescales to the token's precision. The
    /// result is rounded **up** to the next base unit so settlement never
    /// undershoots the quoted fiat price.
    ///
    /// # Errors
    ///
    /// - [`AmountError::Negative`] if `total` or `rate` is negative.
    /// - [`AmountError::Overflow`] if an intermediate product exceeds 256
    ///   bits.
    pub fn from_fiat(total: Decimal, rate: Decimal, decimals: u8) -> Result<Self, AmountError> {
        if total.is_sign_negative() || rate.is_sign_negative() {
            return Err(AmountError::Negative);
        }
        let mantissa_total = U256::from(total.mantissa().unsigned_abs());
        let mantissa_rate = U256::from(rate.mantissa().unsigned_abs());
        let numerator = mantissa_total
            .checked_mul(mantissa_rate)
            .and_then(|product| product.checked_mul(pow10(u32::from(decimals)).ok()?))
            .ok_or(AmountError::Overflow)?;
        let denominator = pow10(total.scale() + rate.scale())?;
        // Ceiling division: (n + d - 1) / d.
        let value = numerator
            .checked_add(denominator - U256::from(1u64))
            .ok_or(AmountError::Overflow)?
            / denominator;
        Ok(Self { value, decimals })
    }

    /// Returns the raw base-unit value.
    #[must_use]
    pub const fn value(&self) -> U256 {
        self.value
    }

    /// Returns the decimal precision carried for display purposes.
    #[must_use]
    pub const fn decimals(&self) -> u8 {
        self.decimals
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(base) = pow10(u32::from(self.decimals)) else {
            // Precision too wide to render fractionally; show base units.
            return write!(f, "{}", self.value);
        };
        let whole = self.value / base;
        let frac = self.value % base;
        if frac.is_zero() {
            return write!(f, "{whole}");
        }
        let digits = format!("{frac:0>width$}", width = usize::from(self.decimals));
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}
