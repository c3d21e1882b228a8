//! The marketplace call builder.
//!
//! Assembles the two descriptors a payment can issue: `approve` on the
//! token contract granting the settlement contract spending rights, and
//! `settle` on the settlement contract pulling the amount to the
//! merchant. Pure and deterministic: the same inputs always yield the
//! same descriptor.

use alloy_primitives::{B256, U256};
use brewline::amount::TokenDeployment;
use brewline::call::{CallArg, CallBuilder, CallDescriptor, EntryPoint};
use brewline::error::AmountError;
use brewline::ledger::LedgerAddress;

use crate::wire::WireAmount;

/// Entrypoint granting an allowance on a token contract.
pub const APPROVE_ENTRYPOINT: &str = "approve";

/// Entrypoint executing a settlement pull on the settlement contract.
pub const SETTLE_ENTRYPOINT: &str = "settle";

/// Builds approval and settlement calls against one settlement contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketCallBuilder {
    settlement: LedgerAddress,
}

impl MarketCallBuilder {
    /// Creates a builder targeting `settlement` for transfer calls.
    #[must_use]
    pub const fn new(settlement: LedgerAddress) -> Self {
        Self { settlement }
    }

    /// The settlement contract transfers are routed through.
    #[must_use]
    pub const fn settlement(&self) -> LedgerAddress {
        self.settlement
    }
}

impl CallBuilder for MarketCallBuilder {
    fn build_approval(
        &self,
        spender: &LedgerAddress,
        amount: U256,
        token: &TokenDeployment,
        nonce: B256,
    ) -> Result<CallDescriptor, AmountError> {
        let wire = WireAmount::try_from_amount(amount)?;
        let [low, high] = wire.words();
        Ok(CallDescriptor {
            target: token.address,
            entrypoint: EntryPoint::new(APPROVE_ENTRYPOINT),
            args: vec![CallArg::Address(*spender), low, high],
            nonce,
        })
    }

    fn build_transfer(
        &self,
        recipient: &LedgerAddress,
        amount: U256,
        token: &TokenDeployment,
        nonce: B256,
    ) -> Result<CallDescriptor, AmountError> {
        let wire = WireAmount::try_from_amount(amount)?;
        let [low, high] = wire.words();
        Ok(CallDescriptor {
            target: self.settlement,
            entrypoint: EntryPoint::new(SETTLE_ENTRYPOINT),
            args: vec![
                CallArg::Address(token.address),
                CallArg::Address(*recipient),
                low,
                high,
            ],
            nonce,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::keccak256;

    fn addr(byte: u8) -> LedgerAddress {
        LedgerAddress::from_bytes([byte; 32])
    }

    fn usdm() -> TokenDeployment {
        TokenDeployment {
            symbol: "USDm".into(),
            address: addr(1),
            decimals: 6,
        }
    }

    #[test]
    fn test_approval_targets_token_with_spender_and_limbs() {
        let builder = MarketCallBuilder::new(addr(9));
        let nonce = keccak256(b"n");
        let call = builder
            .build_approval(&addr(9), U256::from(60u64), &usdm(), nonce)
            .unwrap();
        assert_eq!(call.target, addr(1));
        assert_eq!(call.entrypoint.as_str(), APPROVE_ENTRYPOINT);
        assert_eq!(
            call.args,
            vec![CallArg::Address(addr(9)), CallArg::Word(60), CallArg::Word(0)]
        );
        assert_eq!(call.nonce, nonce);
    }

    #[test]
    fn test_transfer_targets_settlement_contract() {
        let builder = MarketCallBuilder::new(addr(9));
        let call = builder
            .build_transfer(&addr(3), U256::from(60u64), &usdm(), keccak256(b"n"))
            .unwrap();
        assert_eq!(call.target, addr(9));
        assert_eq!(call.entrypoint.as_str(), SETTLE_ENTRYPOINT);
        assert_eq!(call.args[0], CallArg::Address(addr(1)));
        assert_eq!(call.args[1], CallArg::Address(addr(3)));
    }

    #[test]
    fn test_builder_is_deterministic() {
        let builder = MarketCallBuilder::new(addr(9));
        let nonce = keccak256(b"same");
        let a = builder
            .build_transfer(&addr(3), U256::from(1_000_000u64), &usdm(), nonce)
            .unwrap();
        let b = builder
            .build_transfer(&addr(3), U256::from(1_000_000u64), &usdm(), nonce)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_out_of_range_amount_is_rejected() {
        let builder = MarketCallBuilder::new(addr(9));
        let over = U256::from(u128::MAX) + U256::from(1u64);
        assert_eq!(
            builder.build_transfer(&addr(3), over, &usdm(), keccak256(b"n")),
            Err(AmountError::OutOfRange)
        );
    }
}
