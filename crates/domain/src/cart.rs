//! Cart aggregate.

use common::{CartId, ProductId, UserId, Version};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::line::{CartLine, LineSnapshot, MAX_LINE_QUANTITY, ProductSnapshot};
use crate::Money;

/// Errors raised when a cart mutation would leave the representable range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// The line would hold more than [`MAX_LINE_QUANTITY`] units.
    #[error(
        "Quantity limit exceeded for product {product_id}: {current} + {added} is above {max}",
        max = MAX_LINE_QUANTITY
    )]
    QuantityLimit {
        product_id: ProductId,
        current: u32,
        added: u32,
    },

    /// The line or cart total would not fit in a money amount.
    #[error("Cart total out of range with {quantity} units of product {product_id}")]
    AmountOverflow { product_id: ProductId, quantity: u32 },
}

/// A user's shopping cart.
///
/// Holds at most one line per product, and every line has a quantity in
/// `1..=MAX_LINE_QUANTITY`. Operations given a non-positive quantity either
/// do nothing (`add_item`) or remove the line (`set_quantity`). A change
/// that would push a line past the limit, or the cart total out of range,
/// is rejected and leaves the cart untouched.
///
/// The version is owned by the store: it is the row version the cart was
/// loaded at and is used to detect concurrent writers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    id: CartId,
    user_id: UserId,
    version: Version,
    lines: Vec<CartLine>,
}

impl Cart {
    /// Creates an empty cart for a user.
    pub fn new(user_id: UserId) -> Self {
        Self {
            id: CartId::new(),
            user_id,
            version: Version::initial(),
            lines: Vec::new(),
        }
    }

    /// Rebuilds a cart from persisted rows.
    ///
    /// Persistence reload path only; it trusts the store's uniqueness
    /// constraints instead of re-checking them.
    #[doc(hidden)]
    pub fn rehydrate(id: CartId, user_id: UserId, version: Version, lines: Vec<CartLine>) -> Self {
        Self {
            id,
            user_id,
            version,
            lines,
        }
    }

    pub fn id(&self) -> CartId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Returns the version this cart was loaded at.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Records the version assigned by the store after a successful save.
    #[doc(hidden)]
    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Returns the line for a product, if any.
    pub fn line(&self, product_id: ProductId) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.product_id() == product_id)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Returns the number of distinct product lines.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Returns the sum of all line quantities.
    pub fn total_quantity(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity())).sum()
    }

    /// Returns the sum of all line totals, computed on every call.
    pub fn total(&self) -> Money {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// Adds `quantity` units of a product.
    ///
    /// An existing line for the product is increased and its name/price
    /// refreshed to the given snapshot; otherwise a new line is appended.
    /// Returns the resulting line, or `None` when `quantity <= 0` (no-op).
    pub fn add_item(
        &mut self,
        product: ProductSnapshot,
        quantity: i32,
    ) -> Result<Option<CartLine>, CartError> {
        if quantity <= 0 {
            return Ok(None);
        }

        let product_id = product.product_id();
        let idx = self.position(product_id);
        let current = idx.map_or(0, |i| self.lines[i].units());
        let units = current
            .checked_add(quantity)
            .ok_or(CartError::QuantityLimit {
                product_id,
                current: current.unsigned_abs(),
                added: quantity.unsigned_abs(),
            })?;
        self.check_total(idx, product_id, product.unit_price(), units)?;

        let line = match idx {
            Some(idx) => {
                let line = &mut self.lines[idx];
                line.refresh(product, units);
                line.clone()
            }
            None => {
                let line = CartLine::new(product, units);
                self.lines.push(line.clone());
                line
            }
        };
        Ok(Some(line))
    }

    /// Sets a line's quantity exactly.
    ///
    /// `quantity <= 0` removes the line. Unknown products are ignored.
    /// Returns true if the cart changed.
    pub fn set_quantity(
        &mut self,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<bool, CartError> {
        let Some(idx) = self.position(product_id) else {
            return Ok(false);
        };

        if quantity <= 0 {
            self.lines.remove(idx);
            return Ok(true);
        }
        if self.lines[idx].units() == quantity {
            return Ok(false);
        }

        self.check_total(Some(idx), product_id, self.lines[idx].unit_price(), quantity)?;
        self.lines[idx].set_quantity(quantity);
        Ok(true)
    }

    /// Removes the line for a product. No-op if absent.
    pub fn remove_item(&mut self, product_id: ProductId) -> Option<CartLine> {
        let idx = self.position(product_id)?;
        Some(self.lines.remove(idx))
    }

    /// Removes every line. The cart itself survives.
    ///
    /// Returns the number of lines removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.lines.len();
        self.lines.clear();
        removed
    }

    /// Returns the current lines as input for order creation.
    pub fn line_snapshots(&self) -> Vec<LineSnapshot> {
        self.lines.iter().map(CartLine::to_line_snapshot).collect()
    }

    fn position(&self, product_id: ProductId) -> Option<usize> {
        self.lines.iter().position(|l| l.product_id() == product_id)
    }

    /// Checks that the cart total stays in range once the line at
    /// `replacing` (or a new line) holds `units` at `unit_price`.
    fn check_total(
        &self,
        replacing: Option<usize>,
        product_id: ProductId,
        unit_price: Money,
        units: i32,
    ) -> Result<(), CartError> {
        let overflow = CartError::AmountOverflow {
            product_id,
            quantity: units.unsigned_abs(),
        };
        let line_total = unit_price
            .checked_multiply(units.unsigned_abs())
            .ok_or_else(|| overflow.clone())?;

        self.lines
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != replacing)
            .try_fold(line_total, |acc, (_, line)| {
                line.checked_line_total().and_then(|t| acc.checked_add(t))
            })
            .map(|_| ())
            .ok_or(overflow)
    }
}
