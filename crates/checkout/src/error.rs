//! Shop error types.

use cart_store::StoreError;
use common::OrderId;
use domain::{CartError, OrderError};
use thiserror::Error;

/// Errors surfaced by shop operations.
///
/// Conflicts only appear here once the store or coordinator has spent its
/// retry budget.
#[derive(Debug, Error)]
pub enum ShopError {
    /// The referenced cart, order or product does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Checkout was attempted on a missing or empty cart.
    #[error("Cart is empty")]
    EmptyCart,

    /// An order would have had no positive-quantity lines.
    #[error("Order has no items")]
    EmptyOrder,

    /// The cart refused the change, leaving it as it was.
    #[error(transparent)]
    Cart(CartError),

    /// The order total does not fit a money amount.
    #[error("Order total is out of range")]
    AmountOverflow,

    /// Concurrent modification outlasted every retry.
    #[error("The cart was modified by another request while running {operation}. Please retry.")]
    Conflict { operation: &'static str },

    /// Status value outside the fixed set.
    #[error("Invalid order status: {0:?}")]
    InvalidStatus(String),

    /// The requester may not see this order.
    #[error("Access to order {0} is not allowed")]
    Forbidden(OrderId),

    /// Persistence failure unrelated to the request itself.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl ShopError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<StoreError> for ShopError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::Cart(e) => Self::Cart(e),
            StoreError::RetriesExhausted(exhausted) => Self::Conflict {
                operation: exhausted.operation,
            },
            // A store that does not retry on its own.
            StoreError::Conflict { .. } => Self::Conflict { operation: "write" },
            other => Self::Store(other),
        }
    }
}

impl From<OrderError> for ShopError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::EmptyOrder => Self::EmptyOrder,
            OrderError::AmountOverflow => Self::AmountOverflow,
            OrderError::InvalidStatus { status } => Self::InvalidStatus(status),
        }
    }
}

/// Convenience type alias for shop results.
pub type Result<T> = std::result::Result<T, ShopError>;

#[cfg(test)]
mod tests {
    use cart_store::RetryExhausted;

    use super::*;

    #[test]
    fn exhausted_retries_become_conflict() {
        let err = ShopError::from(StoreError::from(RetryExhausted {
            operation: "upsert_line",
            attempts: 3,
        }));
        assert!(matches!(
            err,
            ShopError::Conflict {
                operation: "upsert_line"
            }
        ));
        assert!(err.to_string().ends_with("Please retry."));
    }

    #[test]
    fn store_not_found_keeps_entity() {
        let err = ShopError::from(StoreError::not_found("cart", "42"));
        assert_eq!(err.to_string(), "cart not found: 42");
    }

    #[test]
    fn cart_rejections_keep_their_cause() {
        let cause = CartError::QuantityLimit {
            product_id: common::ProductId::new(),
            current: 5,
            added: domain::MAX_LINE_QUANTITY,
        };
        let err = ShopError::from(StoreError::from(cause.clone()));
        assert!(matches!(&err, ShopError::Cart(e) if *e == cause));
        assert_eq!(err.to_string(), cause.to_string());
    }

    #[test]
    fn infrastructure_errors_pass_through() {
        let err = ShopError::from(StoreError::corrupt("order", "status \"Lost\""));
        assert!(matches!(err, ShopError::Store(StoreError::Corrupt { .. })));
    }

    #[test]
    fn order_errors_map_one_to_one() {
        assert!(matches!(
            ShopError::from(OrderError::EmptyOrder),
            ShopError::EmptyOrder
        ));
        assert!(matches!(
            ShopError::from(OrderError::InvalidStatus { status: "Lost".into() }),
            ShopError::InvalidStatus(s) if s == "Lost"
        ));
        assert!(matches!(
            ShopError::from(OrderError::AmountOverflow),
            ShopError::AmountOverflow
        ));
    }
}
