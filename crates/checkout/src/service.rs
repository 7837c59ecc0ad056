//! Shop service providing the cart, checkout and order operations.

use cart_store::{CartStore, OrderStore, ProductCatalog, RetryPolicy};
use common::{OrderId, ProductId, UserId};
use domain::{Cart, CartLine, Order, OrderStatus};

use crate::coordinator::{CheckoutCoordinator, OrderSummary};
use crate::error::{Result, ShopError};
use crate::requester::Requester;

/// Service for cart edits, checkout and order management.
///
/// Generic over the cart store `C`, the order store `O` and the product
/// catalog `P` so the same service runs against PostgreSQL or the
/// in-memory backends.
pub struct ShopService<C, O, P> {
    carts: C,
    orders: O,
    catalog: P,
    checkout: CheckoutCoordinator<C>,
}

impl<C, O, P> ShopService<C, O, P>
where
    C: CartStore + Clone,
    O: OrderStore,
    P: ProductCatalog,
{
    /// Creates a service; `checkout_policy` bounds checkout retries.
    pub fn new(carts: C, orders: O, catalog: P, checkout_policy: RetryPolicy) -> Self {
        Self {
            checkout: CheckoutCoordinator::new(carts.clone(), checkout_policy),
            carts,
            orders,
            catalog,
        }
    }

    pub fn carts(&self) -> &C {
        &self.carts
    }

    pub fn orders(&self) -> &O {
        &self.orders
    }

    pub fn catalog(&self) -> &P {
        &self.catalog
    }

    async fn existing_cart(&self, user_id: UserId) -> Result<Cart> {
        self.carts
            .find_cart(user_id)
            .await?
            .ok_or_else(|| ShopError::not_found("cart", user_id))
    }

    /// Returns the user's cart, creating an empty one on first access.
    #[tracing::instrument(skip(self))]
    pub async fn get_or_create_cart(&self, user_id: UserId) -> Result<Cart> {
        Ok(self.carts.get_or_create_cart(user_id).await?)
    }

    /// Adds `quantity` units of a catalog product to the user's cart.
    ///
    /// The product's current name and price are snapshotted into the line.
    /// A non-positive quantity is a no-op and returns `None`.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<Option<CartLine>> {
        let product = self
            .catalog
            .find_product(product_id)
            .await?
            .ok_or_else(|| ShopError::not_found("product", product_id))?;

        if quantity <= 0 {
            return Ok(None);
        }

        let cart = self.carts.get_or_create_cart(user_id).await?;
        let line = self.carts.upsert_line(cart.id(), &product, quantity).await?;

        metrics::counter!("cart_line_upserts_total").increment(1);
        Ok(line)
    }

    /// Sets a line's quantity exactly; `quantity <= 0` removes the line.
    #[tracing::instrument(skip(self))]
    pub async fn set_cart_quantity(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<()> {
        let cart = self.existing_cart(user_id).await?;
        self.carts
            .set_line_quantity(cart.id(), product_id, quantity)
            .await?;
        Ok(())
    }

    /// Removes a product's line. Absent lines are not an error.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, user_id: UserId, product_id: ProductId) -> Result<()> {
        let cart = self.existing_cart(user_id).await?;
        self.carts.remove_line(cart.id(), product_id).await?;
        Ok(())
    }

    /// Empties the user's cart.
    #[tracing::instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: UserId) -> Result<()> {
        let cart = self.existing_cart(user_id).await?;
        self.carts.clear_lines(cart.id()).await?;
        Ok(())
    }

    pub async fn checkout(&self, user_id: UserId) -> Result<OrderSummary> {
        self.checkout.checkout(user_id).await
    }

    /// The user's orders, newest first.
    pub async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        Ok(self.orders.orders_for_user(user_id).await?)
    }

    /// Every order, newest first.
    pub async fn all_orders(&self) -> Result<Vec<Order>> {
        Ok(self.orders.all_orders().await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId, requester: Requester) -> Result<Order> {
        let order = self
            .orders
            .find_order(order_id)
            .await?
            .ok_or_else(|| ShopError::not_found("order", order_id))?;

        if !requester.can_view(&order) {
            return Err(ShopError::Forbidden(order_id));
        }
        Ok(order)
    }

    /// Moves an order to the named status.
    ///
    /// Unknown status names are rejected before the order is loaded, so a
    /// rejected change never touches it. Any known status may follow any
    /// other.
    #[tracing::instrument(skip(self))]
    pub async fn set_order_status(&self, order_id: OrderId, status: &str) -> Result<Order> {
        let status: OrderStatus = status.parse()?;

        let mut order = self
            .orders
            .find_order(order_id)
            .await?
            .ok_or_else(|| ShopError::not_found("order", order_id))?;

        let previous = match status {
            OrderStatus::Paid => order.mark_paid(),
            other => order.set_status(other),
        };
        self.orders.save_order_status(&order).await?;

        metrics::counter!("order_status_changes_total", "status" => status.as_str()).increment(1);
        tracing::info!(from = %previous, to = %status, "Order status changed");
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use cart_store::{InMemoryProductCatalog, InMemoryStore, OptimisticCartStore};
    use domain::{CartError, Money, ProductSnapshot};

    use super::*;

    type TestService =
        ShopService<OptimisticCartStore<InMemoryStore>, InMemoryStore, InMemoryProductCatalog>;

    async fn setup() -> (TestService, ProductSnapshot) {
        let repo = InMemoryStore::new();
        let catalog = InMemoryProductCatalog::new();
        let widget =
            ProductSnapshot::new(ProductId::new(), "Widget", Money::from_cents(1250)).unwrap();
        catalog.insert(widget.clone()).await;

        let service = ShopService::new(
            OptimisticCartStore::with_policy(repo.clone(), RetryPolicy::immediate(3)),
            repo,
            catalog,
            RetryPolicy::immediate(3),
        );
        (service, widget)
    }

    #[tokio::test]
    async fn add_item_snapshots_catalog_product() {
        let (service, widget) = setup().await;
        let user_id = UserId::new();

        let line = service
            .add_item(user_id, widget.product_id(), 2)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(line.name(), "Widget");
        assert_eq!(line.line_total(), Money::from_cents(2500));
        let cart = service.get_or_create_cart(user_id).await.unwrap();
        assert_eq!(cart.total(), Money::from_cents(2500));
    }

    #[tokio::test]
    async fn add_unknown_product_is_not_found() {
        let (service, _) = setup().await;

        let result = service.add_item(UserId::new(), ProductId::new(), 1).await;

        assert!(matches!(
            result,
            Err(ShopError::NotFound {
                entity: "product",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn add_non_positive_quantity_is_noop() {
        let (service, widget) = setup().await;
        let user_id = UserId::new();

        assert!(service.add_item(user_id, widget.product_id(), 0).await.unwrap().is_none());
        assert!(service.carts().find_cart(user_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn add_past_the_line_limit_keeps_the_cart() {
        let (service, widget) = setup().await;
        let user_id = UserId::new();
        service
            .add_item(user_id, widget.product_id(), i32::MAX)
            .await
            .unwrap();

        let result = service.add_item(user_id, widget.product_id(), 1).await;

        assert!(matches!(
            result,
            Err(ShopError::Cart(CartError::QuantityLimit { current, added: 1, .. }))
                if current == domain::MAX_LINE_QUANTITY
        ));
        let cart = service.get_or_create_cart(user_id).await.unwrap();
        assert_eq!(
            cart.line(widget.product_id()).unwrap().quantity(),
            domain::MAX_LINE_QUANTITY
        );
    }

    #[tokio::test]
    async fn cart_edits_need_a_cart() {
        let (service, widget) = setup().await;
        let user_id = UserId::new();

        assert!(matches!(
            service.remove_item(user_id, widget.product_id()).await,
            Err(ShopError::NotFound { entity: "cart", .. })
        ));
        assert!(matches!(
            service.clear_cart(user_id).await,
            Err(ShopError::NotFound { entity: "cart", .. })
        ));
        assert!(matches!(
            service.set_cart_quantity(user_id, widget.product_id(), 3).await,
            Err(ShopError::NotFound { entity: "cart", .. })
        ));
    }

    #[tokio::test]
    async fn set_quantity_then_remove_absent_is_fine() {
        let (service, widget) = setup().await;
        let user_id = UserId::new();
        service.add_item(user_id, widget.product_id(), 1).await.unwrap();

        service
            .set_cart_quantity(user_id, widget.product_id(), 0)
            .await
            .unwrap();
        service.remove_item(user_id, widget.product_id()).await.unwrap();

        assert!(service.get_or_create_cart(user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_order_checks_ownership() {
        let (service, widget) = setup().await;
        let owner = UserId::new();
        service.add_item(owner, widget.product_id(), 1).await.unwrap();
        let summary = service.checkout(owner).await.unwrap();

        let mine = service
            .get_order(summary.id, Requester::customer(owner))
            .await
            .unwrap();
        assert_eq!(mine.id(), summary.id);

        let stranger = service
            .get_order(summary.id, Requester::customer(UserId::new()))
            .await;
        assert!(matches!(stranger, Err(ShopError::Forbidden(id)) if id == summary.id));

        let admin = service
            .get_order(summary.id, Requester::admin(UserId::new()))
            .await;
        assert!(admin.is_ok());

        let missing = service
            .get_order(OrderId::new(), Requester::admin(UserId::new()))
            .await;
        assert!(matches!(missing, Err(ShopError::NotFound { .. })));
    }

    #[tokio::test]
    async fn set_order_status_rejects_unknown_values() {
        let (service, widget) = setup().await;
        let user_id = UserId::new();
        service.add_item(user_id, widget.product_id(), 1).await.unwrap();
        let summary = service.checkout(user_id).await.unwrap();

        let result = service.set_order_status(summary.id, "Refunded").await;

        assert!(matches!(result, Err(ShopError::InvalidStatus(s)) if s == "Refunded"));
        let order = service.orders().find_order(summary.id).await.unwrap().unwrap();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.updated_at(), order.created_at());
    }

    #[tokio::test]
    async fn set_order_status_is_permissive() {
        let (service, widget) = setup().await;
        let user_id = UserId::new();
        service.add_item(user_id, widget.product_id(), 1).await.unwrap();
        let summary = service.checkout(user_id).await.unwrap();

        for status in ["Cancelled", "Paid", "Shipped", "Pending"] {
            let order = service.set_order_status(summary.id, status).await.unwrap();
            assert_eq!(order.status().as_str(), status);
        }

        let stored = service.orders().find_order(summary.id).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Pending);
        assert!(stored.updated_at() >= stored.created_at());
    }

    #[tokio::test]
    async fn set_status_of_unknown_order_is_not_found() {
        let (service, _) = setup().await;
        let result = service.set_order_status(OrderId::new(), "Paid").await;
        assert!(matches!(result, Err(ShopError::NotFound { entity: "order", .. })));
    }
}
