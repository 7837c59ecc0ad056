use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{CartId, OrderId, ProductId, UserId, Version};
use domain::{Cart, Order, ProductSnapshot};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    store::{CartRepository, OrderStore, ProductCatalog},
};

#[derive(Default)]
struct State {
    carts: HashMap<CartId, Cart>,
    carts_by_user: HashMap<UserId, CartId>,
    orders: HashMap<OrderId, Order>,
}

impl State {
    /// Checks `cart` against the stored version and writes it with the
    /// next version.
    fn compare_and_swap(&mut self, cart: &Cart) -> Result<Version> {
        let stored = self
            .carts
            .get(&cart.id())
            .ok_or_else(|| StoreError::not_found("cart", cart.id()))?;

        if stored.version() != cart.version() {
            return Err(StoreError::conflict("cart", cart.id()));
        }

        let version = cart.version().next();
        let mut updated = cart.clone();
        updated.set_version(version);
        self.carts.insert(cart.id(), updated);
        Ok(version)
    }
}

/// In-memory cart and order store.
///
/// Provides the same versioned semantics as a database-backed repository:
/// saves are compare-and-swap on the cart version and a user can own at
/// most one cart. Wrap it in an [`OptimisticCartStore`](crate::OptimisticCartStore)
/// to get a full `CartStore`.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn cart_count(&self) -> usize {
        self.state.read().await.carts.len()
    }

    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }
}

#[async_trait]
impl CartRepository for InMemoryStore {
    async fn load_by_user(&self, user_id: UserId) -> Result<Option<Cart>> {
        let state = self.state.read().await;
        Ok(state
            .carts_by_user
            .get(&user_id)
            .and_then(|id| state.carts.get(id))
            .cloned())
    }

    async fn load(&self, cart_id: CartId) -> Result<Option<Cart>> {
        Ok(self.state.read().await.carts.get(&cart_id).cloned())
    }

    async fn insert(&self, cart: &Cart) -> Result<()> {
        let mut state = self.state.write().await;

        if state.carts_by_user.contains_key(&cart.user_id())
            || state.carts.contains_key(&cart.id())
        {
            return Err(StoreError::conflict("cart", cart.id()));
        }

        state.carts_by_user.insert(cart.user_id(), cart.id());
        state.carts.insert(cart.id(), cart.clone());
        Ok(())
    }

    async fn save(&self, cart: &Cart) -> Result<Version> {
        self.state.write().await.compare_and_swap(cart)
    }

    async fn save_with_order(&self, cart: &Cart, order: &Order) -> Result<Version> {
        let mut state = self.state.write().await;

        if state.orders.contains_key(&order.id()) {
            return Err(StoreError::conflict("order", order.id()));
        }

        let version = state.compare_and_swap(cart)?;
        state.orders.insert(order.id(), order.clone());
        Ok(version)
    }
}

fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
    orders
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let orders = state
            .orders
            .values()
            .filter(|o| o.user_id() == user_id)
            .cloned()
            .collect();
        Ok(newest_first(orders))
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        let orders = self.state.read().await.orders.values().cloned().collect();
        Ok(newest_first(orders))
    }

    async fn save_order_status(&self, order: &Order) -> Result<()> {
        let mut state = self.state.write().await;
        let stored = state
            .orders
            .get_mut(&order.id())
            .ok_or_else(|| StoreError::not_found("order", order.id()))?;

        // Lines are immutable once placed; only the status fields move.
        *stored = Order::rehydrate(
            stored.id(),
            stored.user_id(),
            stored.lines().to_vec(),
            order.status(),
            stored.created_at(),
            order.updated_at().max(stored.created_at()),
        );
        Ok(())
    }
}

/// In-memory product catalog.
#[derive(Clone, Default)]
pub struct InMemoryProductCatalog {
    products: Arc<RwLock<HashMap<ProductId, ProductSnapshot>>>,
}

impl InMemoryProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a product.
    pub async fn insert(&self, product: ProductSnapshot) {
        self.products
            .write()
            .await
            .insert(product.product_id(), product);
    }

    pub async fn remove(&self, product_id: ProductId) -> Option<ProductSnapshot> {
        self.products.write().await.remove(&product_id)
    }

    pub async fn len(&self) -> usize {
        self.products.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.products.read().await.is_empty()
    }
}

#[async_trait]
impl ProductCatalog for InMemoryProductCatalog {
    async fn find_product(&self, product_id: ProductId) -> Result<Option<ProductSnapshot>> {
        Ok(self.products.read().await.get(&product_id).cloned())
    }
}
