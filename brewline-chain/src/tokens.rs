//! Registry of well-known settlement-token deployments.
//!
//! The marketplace settles in a small set of stable tokens; this module
//! maps their ticker symbols to on-ledger deployments so checkout code can
//! resolve a buyer's currency choice without carrying addresses around.

use std::sync::OnceLock;

use alloy_primitives::b256;
use brewline::amount::TokenDeployment;
use brewline::ledger::LedgerAddress;

fn registry() -> &'static [TokenDeployment] {
    static TOKENS: OnceLock<Vec<TokenDeployment>> = OnceLock::new();
    TOKENS.get_or_init(|| {
        vec![
            TokenDeployment {
                symbol: "USDm".into(),
                address: LedgerAddress::from(b256!(
                    "049d36570d4e46f48e99674bd3fcc84644ddd6b96f7c741b1562b82f9e004dc7"
                )),
                decimals: 6,
            },
            TokenDeployment {
                symbol: "EURm".into(),
                address: LedgerAddress::from(b256!(
                    "053c91253bc9682c04929ca02ed00b3e423f6710d2ee7e0d5ebb06f3ecf368a8"
                )),
                decimals: 6,
            },
            TokenDeployment {
                symbol: "WBTC".into(),
                address: LedgerAddress::from(b256!(
                    "03fe2b97c1fd336e750087d68b9b867997fd64a2661ff3ca5a7c771641e8e7ac"
                )),
                decimals: 8,
            },
        ]
    })
}

/// All known settlement-token deployments.
#[must_use]
pub fn known_tokens() -> &'static [TokenDeployment] {
    registry()
}

/// Looks up a deployment by ticker symbol (case-sensitive).
#[must_use]
pub fn deployment_by_symbol(symbol: &str) -> Option<&'static TokenDeployment> {
    registry().iter().find(|t| t.symbol == symbol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_symbol() {
        let usdm = deployment_by_symbol("USDm").unwrap();
        assert_eq!(usdm.decimals, 6);
        assert!(deployment_by_symbol("DOGE").is_none());
    }

    #[test]
    fn test_registry_symbols_are_unique() {
        let mut symbols: Vec<&str> = known_tokens().iter().map(|t| t.symbol.as_str()).collect();
        symbols.sort_unstable();
        symbols.dedup();
        assert_eq!(symbols.len(), known_tokens().len());
    }
}
