//! Checkout session state: step progression, delivery, settlement currency.
//!
//! Steps move strictly forward except through explicit [`CheckoutSession::back`].
//! A step cannot be left until its inputs exist: a delivery method before
//! leaving [`CheckoutStep::Delivery`], a settlement currency before leaving
//! [`CheckoutStep::Currency`]. The address fields exist only on the
//! delivery variant that needs them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::amount::TokenDeployment;

/// Identity of one checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a session identity.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The four checkout steps, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CheckoutStep {
    /// Choose pickup or courier delivery.
    Delivery,
    /// Choose the settlement currency.
    Currency,
    /// Commit and run the payment attempt.
    Payment,
    /// Terminal step after a confirmed transfer.
    Confirmation,
}

impl CheckoutStep {
    /// The step after this one, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Delivery => Some(Self::Currency),
            Self::Currency => Some(Self::Payment),
            Self::Payment => Some(Self::Confirmation),
            Self::Confirmation => None,
        }
    }

    /// The step before this one, if any.
    #[must_use]
    pub const fn prev(self) -> Option<Self> {
        match self {
            Self::Delivery => None,
            Self::Currency => Some(Self::Delivery),
            Self::Payment => Some(Self::Currency),
            Self::Confirmation => Some(Self::Payment),
        }
    }
}

/// A physical shipping address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
    /// Recipient name.
    pub recipient: String,
    /// Street and number.
    pub street: String,
    /// City.
    pub city: String,
    /// Postal code.
    pub postal_code: String,
    /// ISO country code.
    pub country: String,
}

/// How the order reaches the buyer. Only courier delivery carries an
/// address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum DeliveryMethod {
    /// Collected at a pickup point.
    Pickup {
        /// Pickup point identifier.
        point: String,
    },
    /// Shipped by courier to a physical address.
    Courier {
        /// Destination address.
        address: PostalAddress,
    },
}

/// Error raised when a step transition's inputs are missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// No delivery method chosen yet.
    #[error("a delivery method must be chosen first")]
    MissingDelivery,

    /// No settlement currency chosen yet.
    #[error("a settlement currency must be chosen first")]
    MissingCurrency,

    /// Already at the final step.
    #[error("checkout is already complete")]
    AtFinalStep,
}

/// Mutable state of one checkout flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Session identity.
    pub id: SessionId,
    /// Current step.
    pub step: CheckoutStep,
    /// Chosen delivery method, if any.
    pub delivery: Option<DeliveryMethod>,
    /// Chosen settlement currency, if any.
    pub currency: Option<TokenDeployment>,
}

impl CheckoutSession {
    /// Begins a new checkout at the delivery step.
    #[must_use]
    pub const fn begin(id: SessionId) -> Self {
        Self {
            id,
            step: CheckoutStep::Delivery,
            delivery: None,
            currency: None,
        }
    }

    /// Records the delivery method.
    pub fn set_delivery(&mut self, delivery: DeliveryMethod) {
        self.delivery = Some(delivery);
    }

    /// Records the settlement currency.
    pub fn set_currency(&mut self, currency: TokenDeployment) {
        self.currency = Some(currency);
    }

    /// Moves one step forward.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the current step's inputs are missing
    /// or checkout is already complete.
    pub fn advance(&mut self) -> Result<CheckoutStep, SessionError> {
        match self.step {
            CheckoutStep::Delivery if self.delivery.is_none() => {
                return Err(SessionError::MissingDelivery);
            }
            CheckoutStep::Currency if self.currency.is_none() => {
                return Err(SessionError::MissingCurrency);
            }
            _ => {}
        }
        let next = self.step.next().ok_or(SessionError::AtFinalStep)?;
        self.step = next;
        Ok(next)
    }

    /// Explicit back-navigation; no-op at the first step.
    pub fn back(&mut self) {
        if let Some(prev) = self.step.prev() {
            self.step = prev;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerAddress;

    fn usdm() -> TokenDeployment {
        TokenDeployment {
            symbol: "USDm".into(),
            address: LedgerAddress::from_bytes([1u8; 32]),
            decimals: 6,
        }
    }

    #[test]
    fn test_advance_requires_delivery() {
        let mut session = CheckoutSession::begin(SessionId::new("s1"));
        assert_eq!(session.advance(), Err(SessionError::MissingDelivery));
        session.set_delivery(DeliveryMethod::Pickup {
            point: "roastery".into(),
        });
        assert_eq!(session.advance(), Ok(CheckoutStep::Currency));
    }

    #[test]
    fn test_advance_requires_currency() {
        let mut session = CheckoutSession::begin(SessionId::new("s1"));
        session.set_delivery(DeliveryMethod::Pickup {
            point: "roastery".into(),
        });
        session.advance().unwrap();
        assert_eq!(session.advance(), Err(SessionError::MissingCurrency));
        session.set_currency(usdm());
        assert_eq!(session.advance(), Ok(CheckoutStep::Payment));
    }

    #[test]
    fn test_back_is_explicit_and_bounded() {
        let mut session = CheckoutSession::begin(SessionId::new("s1"));
        session.back();
        assert_eq!(session.step, CheckoutStep::Delivery);
        session.set_delivery(DeliveryMethod::Courier {
            address: PostalAddress {
                recipient: "A. Buyer".into(),
                street: "1 Bean St".into(),
                city: "Portland".into(),
                postal_code: "97201".into(),
                country: "US".into(),
            },
        });
        session.advance().unwrap();
        session.back();
        assert_eq!(session.step, CheckoutStep::Delivery);
    }

    #[test]
    fn test_no_advance_past_confirmation() {
        let mut session = CheckoutSession::begin(SessionId::new("s1"));
        session.set_delivery(DeliveryMethod::Pickup { point: "p".into() });
        session.set_currency(usdm());
        session.advance().unwrap();
        session.advance().unwrap();
        session.advance().unwrap();
        assert_eq!(session.step, CheckoutStep::Confirmation);
        assert_eq!(session.advance(), Err(SessionError::AtFinalStep));
    }
}
