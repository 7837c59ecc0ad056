//! Order aggregate and related types.

mod aggregate;
mod status;

pub use aggregate::Order;
pub use status::OrderStatus;

use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// No line with a positive quantity was supplied.
    #[error("Order has no items")]
    EmptyOrder,

    /// The lines' combined total does not fit a money amount.
    #[error("Order total is out of range")]
    AmountOverflow,

    /// Status value outside the fixed set.
    #[error("Invalid order status: {status:?}")]
    InvalidStatus { status: String },
}
