//! Session-scoped cart store with an injected persistence port.
//!
//! The store owns the ordered set of line items for one checkout session.
//! Every mutation is a total function: malformed quantities are
//! unrepresentable ([`std::num::NonZeroU32`]) and duplicate identities
//! merge instead of duplicating lines. After each mutation the full line
//! array is written through the [`CartStorage`] port as a JSON blob so the
//! cart survives reloads; persistence trouble never surfaces as a cart
//! error.

use std::fmt;
use std::num::NonZeroU32;

use alloy_primitives::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use url::Url;

/// Stable identity of a cart line within one session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineId(String);

impl LineId {
    /// Creates a line identity from a stable string key.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Grind state of a coffee listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Grind {
    /// Shipped as whole beans.
    WholeBean,
    /// Ground before shipping.
    Ground,
}

/// One line of the cart: a listing, how it is prepared, and how many.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    /// Stable identity; repeat-adds of the same identity merge.
    pub id: LineId,
    /// On-chain listing identity of the product.
    pub token: U256,
    /// Display name.
    pub name: String,
    /// Grind state.
    pub grind: Grind,
    /// Quantity, always at least one.
    pub quantity: NonZeroU32,
    /// Unit price in the cart's fiat currency.
    pub unit_price: Decimal,
    /// Product image reference.
    pub image: Url,
}

/// Error surfaced by a [`CartStorage`] implementation.
#[derive(Debug, thiserror::Error)]
#[error("cart storage: {0}")]
pub struct StorageError(pub String);

/// Durable key-value persistence for the cart blob.
///
/// One blob per user profile; never shared across sessions. Implementations
/// are synchronous; the blob is small and lives in client-local storage.
pub trait CartStorage: Send {
    /// Loads the persisted lines, or `None` when nothing was stored yet.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the blob cannot be read or decoded.
    fn load(&self) -> Result<Option<Vec<CartLine>>, StorageError>;

    /// Persists the full line array, replacing any previous blob.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the blob cannot be written.
    fn persist(&self, lines: &[CartLine]) -> Result<(), StorageError>;
}

/// In-memory [`CartStorage`], used in tests and as a default.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blob: std::sync::Mutex<Option<String>>,
}

impl MemoryStorage {
    /// Creates an empty in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CartStorage for MemoryStorage {
    fn load(&self) -> Result<Option<Vec<CartLine>>, StorageError> {
        let blob = self.blob.lock().map_err(|e| StorageError(e.to_string()))?;
        blob.as_deref()
            .map(|raw| serde_json::from_str(raw).map_err(|e| StorageError(e.to_string())))
            .transpose()
    }

    fn persist(&self, lines: &[CartLine]) -> Result<(), StorageError> {
        let raw = serde_json::to_string(lines).map_err(|e| StorageError(e.to_string()))?;
        let mut blob = self.blob.lock().map_err(|e| StorageError(e.to_string()))?;
        *blob = Some(raw);
        Ok(())
    }
}

/// The ordered set of line items for the active session.
pub struct CartStore {
    lines: Vec<CartLine>,
    storage: Box<dyn CartStorage>,
}

impl fmt::Debug for CartStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CartStore")
            .field("lines", &self.lines)
            .finish_non_exhaustive()
    }
}

impl CartStore {
    /// Creates a store backed by the given persistence port, restoring any
    /// previously persisted lines.
    ///
    /// A blob that cannot be loaded is treated as an empty cart.
    #[must_use]
    pub fn with_storage(storage: Box<dyn CartStorage>) -> Self {
        let lines = match storage.load() {
            Ok(lines) => lines.unwrap_or_default(),
            Err(_error) => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(error = %_error, "cart blob unreadable, starting empty");
                Vec::new()
            }
        };
        Self { lines, storage }
    }

    /// Creates an empty store with in-memory persistence.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_storage(Box::new(MemoryStorage::new()))
    }

    /// Adds a line, merging with an existing line of the same identity by
    /// adding quantities. Insertion order of first occurrence is kept.
    pub fn add_line(&mut self, line: CartLine) {
        if let Some(existing) = self.lines.iter_mut().find(|l| l.id == line.id) {
            existing.quantity = existing
                .quantity
                .checked_add(line.quantity.get())
                .unwrap_or(NonZeroU32::MAX);
        } else {
            self.lines.push(line);
        }
        self.flush();
    }

    /// Replaces the quantity of an existing line; no-op when absent.
    pub fn set_quantity(&mut self, id: &LineId, quantity: NonZeroU32) {
        if let Some(line) = self.lines.iter_mut().find(|l| l.id == *id) {
            line.quantity = quantity;
            self.flush();
        }
    }

    /// Removes a line; no-op when absent.
    pub fn remove_line(&mut self, id: &LineId) {
        let before = self.lines.len();
        self.lines.retain(|l| l.id != *id);
        if self.lines.len() != before {
            self.flush();
        }
    }

    /// Empties the store.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.flush();
    }

    /// Returns the lines in insertion order.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Returns whether the cart holds no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Folds `price(line) × quantity` over all lines.
    #[must_use]
    pub fn total_of(&self, price: impl Fn(&CartLine) -> Decimal) -> Decimal {
        self.lines
            .iter()
            .map(|l| price(l) * Decimal::from(l.quantity.get()))
            .sum()
    }

    /// The cart's fiat subtotal from stored unit prices.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.total_of(|l| l.unit_price)
    }

    fn flush(&self) {
        if let Err(_error) = self.storage.persist(&self.lines) {
            #[cfg(feature = "telemetry")]
            tracing::warn!(error = %_error, "cart blob not persisted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: &str, qty: u32, price: &str) -> CartLine {
        CartLine {
            id: LineId::new(id),
            token: U256::from(7u64),
            name: format!("lot {id}"),
            grind: Grind::WholeBean,
            quantity: NonZeroU32::new(qty).unwrap(),
            unit_price: price.parse().unwrap(),
            image: Url::parse("https://cdn.example/beans.png").unwrap(),
        }
    }

    #[test]
    fn test_add_merges_duplicate_identity() {
        let mut cart = CartStore::in_memory();
        cart.add_line(line("yirgacheffe", 1, "14.00"));
        cart.add_line(line("gesha", 2, "32.00"));
        cart.add_line(line("yirgacheffe", 3, "14.00"));
        assert_eq!(cart.lines().len(), 2);
        assert_eq!(cart.lines()[0].id.as_str(), "yirgacheffe");
        assert_eq!(cart.lines()[0].quantity.get(), 4);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut cart = CartStore::in_memory();
        cart.add_line(line("gesha", 1, "32.00"));
        cart.remove_line(&LineId::new("missing"));
        assert_eq!(cart.lines().len(), 1);
    }

    #[test]
    fn test_total_independent_of_insertion_order() {
        let mut forward = CartStore::in_memory();
        forward.add_line(line("a", 2, "10.50"));
        forward.add_line(line("b", 1, "3.25"));
        let mut reverse = CartStore::in_memory();
        reverse.add_line(line("b", 1, "3.25"));
        reverse.add_line(line("a", 2, "10.50"));
        let expected: Decimal = "24.25".parse().unwrap();
        assert_eq!(forward.subtotal(), expected);
        assert_eq!(reverse.subtotal(), expected);
    }

    #[test]
    fn test_total_of_uses_supplied_price() {
        let mut cart = CartStore::in_memory();
        cart.add_line(line("a", 3, "10.00"));
        let discounted = cart.total_of(|l| l.unit_price / Decimal::from(2u32));
        assert_eq!(discounted, "15.00".parse::<Decimal>().unwrap());
    }

    #[test]
    fn test_persistence_roundtrip() {
        let storage = std::sync::Arc::new(MemoryStorage::new());

        struct Shared(std::sync::Arc<MemoryStorage>);
        impl CartStorage for Shared {
            fn load(&self) -> Result<Option<Vec<CartLine>>, StorageError> {
                self.0.load()
            }
            fn persist(&self, lines: &[CartLine]) -> Result<(), StorageError> {
                self.0.persist(lines)
            }
        }

        let mut cart = CartStore::with_storage(Box::new(Shared(std::sync::Arc::clone(&storage))));
        cart.add_line(line("gesha", 2, "32.00"));
        drop(cart);

        let restored = CartStore::with_storage(Box::new(Shared(storage)));
        assert_eq!(restored.lines().len(), 1);
        assert_eq!(restored.lines()[0].quantity.get(), 2);
    }

    #[test]
    fn test_clear_empties_store() {
        let mut cart = CartStore::in_memory();
        cart.add_line(line("a", 1, "5.00"));
        cart.clear();
        assert!(cart.is_empty());
    }
}
