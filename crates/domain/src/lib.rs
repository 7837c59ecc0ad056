//! Domain layer for the shop backend.
//!
//! This crate provides the pure aggregates of the cart and checkout
//! subsystem:
//! - `Cart` with one line per product and on-demand totals
//! - `Order`, an immutable snapshot of purchased lines with a status
//! - `Money` and the product snapshot captured into every line
//!
//! Nothing here performs I/O; persistence and concurrency control live in
//! the `cart-store` crate.

pub mod cart;
pub mod line;
pub mod money;
pub mod order;

pub use cart::{Cart, CartError};
pub use line::{
    CartLine, LineSnapshot, MAX_LINE_QUANTITY, OrderLine, ProductSnapshot, SnapshotError,
};
pub use money::Money;
pub use order::{Order, OrderError, OrderStatus};
