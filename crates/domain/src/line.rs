//! Line items shared by carts and orders.

use common::{LineItemId, ProductId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Money;

/// Errors raised when capturing a product snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    /// Catalog prices are never negative.
    #[error("Invalid price for product {product_id}: {price} (must not be negative)")]
    NegativePrice { product_id: ProductId, price: Money },
}

/// Product name and price captured by value at the moment of a cart mutation.
///
/// Later catalog changes never reach an existing snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    product_id: ProductId,
    name: String,
    unit_price: Money,
}

impl ProductSnapshot {
    /// Captures a snapshot of a catalog product.
    pub fn new(
        product_id: ProductId,
        name: impl Into<String>,
        unit_price: Money,
    ) -> Result<Self, SnapshotError> {
        if unit_price.is_negative() {
            return Err(SnapshotError::NegativePrice {
                product_id,
                price: unit_price,
            });
        }

        Ok(Self {
            product_id,
            name: name.into(),
            unit_price,
        })
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }
}

/// A (snapshot, quantity) pair handed from a cart to order creation.
///
/// Quantity is signed because callers may pass raw values; order creation
/// drops every non-positive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSnapshot {
    pub product: ProductSnapshot,
    pub quantity: i32,
}

impl LineSnapshot {
    pub fn new(product: ProductSnapshot, quantity: i32) -> Self {
        Self { product, quantity }
    }
}

/// Largest quantity a single cart line may hold.
///
/// Matches the range of the persisted `INTEGER` column and of the signed
/// quantities carried by [`LineSnapshot`].
pub const MAX_LINE_QUANTITY: u32 = i32::MAX as u32;

/// A line in a cart. Quantity is always in `1..=MAX_LINE_QUANTITY`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    id: LineItemId,
    product: ProductSnapshot,
    quantity: i32,
}

impl CartLine {
    pub(crate) fn new(product: ProductSnapshot, quantity: i32) -> Self {
        debug_assert!(quantity > 0);
        Self {
            id: LineItemId::new(),
            product,
            quantity,
        }
    }

    /// Rebuilds a line from persisted columns.
    ///
    /// Persistence reload path only; domain code creates lines through
    /// [`crate::Cart::add_item`].
    #[doc(hidden)]
    pub fn rehydrate(id: LineItemId, product: ProductSnapshot, quantity: i32) -> Self {
        Self {
            id,
            product,
            quantity,
        }
    }

    pub fn id(&self) -> LineItemId {
        self.id
    }

    pub fn product_id(&self) -> ProductId {
        self.product.product_id
    }

    pub fn name(&self) -> &str {
        &self.product.name
    }

    pub fn unit_price(&self) -> Money {
        self.product.unit_price
    }

    pub fn product(&self) -> &ProductSnapshot {
        &self.product
    }

    pub fn quantity(&self) -> u32 {
        self.quantity.unsigned_abs()
    }

    pub(crate) fn units(&self) -> i32 {
        self.quantity
    }

    /// Returns `unit_price * quantity`.
    pub fn line_total(&self) -> Money {
        self.product.unit_price.multiply(self.quantity())
    }

    pub(crate) fn checked_line_total(&self) -> Option<Money> {
        self.product.unit_price.checked_multiply(self.quantity())
    }

    /// Sets a new quantity and refreshes the snapshot to the current values.
    pub(crate) fn refresh(&mut self, product: ProductSnapshot, quantity: i32) {
        self.product = product;
        self.quantity = quantity;
    }

    pub(crate) fn set_quantity(&mut self, quantity: i32) {
        self.quantity = quantity;
    }

    /// Returns this line as input for order creation.
    pub fn to_line_snapshot(&self) -> LineSnapshot {
        LineSnapshot::new(self.product.clone(), self.quantity)
    }
}

/// A frozen line of a placed order. Never modified after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    id: LineItemId,
    product: ProductSnapshot,
    quantity: u32,
}

impl OrderLine {
    pub(crate) fn new(product: ProductSnapshot, quantity: u32) -> Self {
        Self {
            id: LineItemId::new(),
            product,
            quantity,
        }
    }

    /// Rebuilds an order line from persisted columns.
    ///
    /// Persistence reload path only.
    #[doc(hidden)]
    pub fn rehydrate(id: LineItemId, product: ProductSnapshot, quantity: u32) -> Self {
        Self {
            id,
            product,
            quantity,
        }
    }

    pub fn id(&self) -> LineItemId {
        self.id
    }

    pub fn product_id(&self) -> ProductId {
        self.product.product_id
    }

    pub fn name(&self) -> &str {
        &self.product.name
    }

    pub fn unit_price(&self) -> Money {
        self.product.unit_price
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn line_total(&self) -> Money {
        self.product.unit_price.multiply(self.quantity)
    }

    pub(crate) fn checked_line_total(&self) -> Option<Money> {
        self.product.unit_price.checked_multiply(self.quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_rejects_negative_price() {
        let product_id = ProductId::new();
        let result = ProductSnapshot::new(product_id, "Broken", Money::from_cents(-1));
        assert_eq!(
            result,
            Err(SnapshotError::NegativePrice {
                product_id,
                price: Money::from_cents(-1),
            })
        );
    }

    #[test]
    fn snapshot_allows_free_products() {
        let snapshot = ProductSnapshot::new(ProductId::new(), "Sticker", Money::zero()).unwrap();
        assert!(snapshot.unit_price().is_zero());
    }

    #[test]
    fn line_total_is_price_times_quantity() {
        let snapshot =
            ProductSnapshot::new(ProductId::new(), "Widget", Money::from_cents(999)).unwrap();
        let line = CartLine::new(snapshot, 3);
        assert_eq!(line.line_total(), Money::from_cents(2997));
    }

    #[test]
    fn refresh_replaces_snapshot_and_quantity() {
        let product_id = ProductId::new();
        let old = ProductSnapshot::new(product_id, "Widget", Money::from_cents(1000)).unwrap();
        let new = ProductSnapshot::new(product_id, "Widget v2", Money::from_cents(1200)).unwrap();

        let mut line = CartLine::new(old, 1);
        line.refresh(new, 3);

        assert_eq!(line.quantity(), 3);
        assert_eq!(line.name(), "Widget v2");
        assert_eq!(line.unit_price(), Money::from_cents(1200));
    }

    #[test]
    fn snapshot_keeps_the_full_quantity() {
        let snapshot =
            ProductSnapshot::new(ProductId::new(), "Bolt", Money::from_cents(1)).unwrap();
        let line = CartLine::new(snapshot, i32::MAX);

        assert_eq!(line.quantity(), MAX_LINE_QUANTITY);
        assert_eq!(line.to_line_snapshot().quantity, i32::MAX);
    }

    #[test]
    fn checked_line_total_detects_overflow() {
        let snapshot =
            ProductSnapshot::new(ProductId::new(), "Yacht", Money::from_cents(i64::MAX / 2))
                .unwrap();
        let line = CartLine::new(snapshot, 3);

        assert_eq!(line.checked_line_total(), None);
        assert_eq!(line.line_total(), Money::from_cents(i64::MAX));
    }
}
