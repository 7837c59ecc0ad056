//! Checkout coordinator: cart to order in one atomic step.

use std::time::Instant;

use cart_store::{CartStore, RetryPolicy, StoreError, retry_with_reload};
use common::{OrderId, UserId};
use domain::{Cart, Money, Order, OrderStatus};
use serde::Serialize;

use crate::error::ShopError;

/// What a successful checkout reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    pub id: OrderId,
    pub status: OrderStatus,
    pub total: Money,
}

impl From<&Order> for OrderSummary {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id(),
            status: order.status(),
            total: order.total(),
        }
    }
}

/// Converts a user's cart into an order.
///
/// The order is built from the cart as loaded and committed only if the
/// cart is unchanged since that load; the same commit empties the cart. A
/// cart changed in between is reloaded and the order rebuilt, within the
/// retry policy's budget.
pub struct CheckoutCoordinator<C> {
    carts: C,
    policy: RetryPolicy,
}

impl<C: CartStore> CheckoutCoordinator<C> {
    pub fn new(carts: C, policy: RetryPolicy) -> Self {
        Self { carts, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Places an order for everything in the user's cart.
    ///
    /// Fails with `EmptyCart`, leaving nothing written, if the user has no
    /// cart or the cart has no lines. An order the domain refuses to build
    /// is reported with the domain's reason and also writes nothing.
    #[tracing::instrument(skip(self))]
    pub async fn checkout(&self, user_id: UserId) -> Result<OrderSummary, ShopError> {
        let started = Instant::now();
        let result = self.try_checkout(user_id).await;

        let outcome = match &result {
            Ok(_) => "placed",
            Err(ShopError::EmptyCart) => "empty",
            Err(ShopError::Conflict { .. }) => "conflict",
            Err(_) => "error",
        };
        metrics::counter!("checkouts_total", "outcome" => outcome).increment(1);
        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());

        if let Ok(summary) = &result {
            tracing::info!(order_id = %summary.id, total = %summary.total, "Order placed");
        }
        result
    }

    async fn try_checkout(&self, user_id: UserId) -> Result<OrderSummary, ShopError> {
        let carts = &self.carts;

        let placed = retry_with_reload(
            &self.policy,
            "checkout",
            StoreError::is_conflict,
            move || async move { carts.find_cart(user_id).await },
            move |cart: Option<Cart>| async move {
                let Some(cart) = cart.filter(|c| !c.is_empty()) else {
                    return Ok(None);
                };
                let order = match Order::create_from_lines(user_id, cart.line_snapshots()) {
                    Ok(order) => order,
                    Err(e) => return Ok(Some(Err(e))),
                };
                carts.commit_checkout(&cart, &order).await?;
                Ok::<_, StoreError>(Some(Ok(order)))
            },
        )
        .await?;

        let order = placed.ok_or(ShopError::EmptyCart)??;
        Ok(OrderSummary::from(&order))
    }
}
