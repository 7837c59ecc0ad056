use async_trait::async_trait;
use common::{CartId, OrderId, ProductId, UserId, Version};
use domain::{Cart, CartLine, Order, ProductSnapshot};

use crate::Result;

/// Concurrency-safe cart persistence.
///
/// Every mutation is atomic with respect to concurrent mutations of the
/// same cart: no increment is lost and at most one line exists per
/// product. All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Returns the user's cart, creating an empty one on first touch.
    ///
    /// Concurrent first touches for one user all observe the same cart.
    async fn get_or_create_cart(&self, user_id: UserId) -> Result<Cart>;

    /// Returns the user's cart without creating one.
    async fn find_cart(&self, user_id: UserId) -> Result<Option<Cart>>;

    /// Adds `delta` units of a product to the cart.
    ///
    /// Creates the line if absent, otherwise increases it and refreshes its
    /// name and unit price from `product`. A non-positive `delta` changes
    /// nothing and returns `None`. Fails with `NotFound` for an unknown
    /// cart.
    async fn upsert_line(
        &self,
        cart_id: CartId,
        product: &ProductSnapshot,
        delta: i32,
    ) -> Result<Option<CartLine>>;

    /// Overwrites a line's quantity; a non-positive quantity removes it.
    ///
    /// Returns whether the cart changed.
    async fn set_line_quantity(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<bool>;

    /// Removes a product's line. Returns whether one existed.
    async fn remove_line(&self, cart_id: CartId, product_id: ProductId) -> Result<bool>;

    /// Removes every line. Returns how many were removed.
    async fn clear_lines(&self, cart_id: CartId) -> Result<usize>;

    /// Stores `order` and empties the cart as one atomic step.
    ///
    /// `cart` is the state the order was built from. If the stored cart has
    /// moved past `cart.version()` nothing is written and `Conflict` is
    /// returned.
    async fn commit_checkout(&self, cart: &Cart, order: &Order) -> Result<()>;
}

/// Order persistence and queries.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Orders placed by `user_id`, newest first.
    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    /// Every order, newest first.
    async fn all_orders(&self) -> Result<Vec<Order>>;

    /// Persists the order's status and `updated_at`.
    async fn save_order_status(&self, order: &Order) -> Result<()>;
}

/// Low-level versioned cart storage.
///
/// Backends without native upsert implement this and gain a `CartStore`
/// through [`OptimisticCartStore`](crate::OptimisticCartStore).
#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn load_by_user(&self, user_id: UserId) -> Result<Option<Cart>>;

    async fn load(&self, cart_id: CartId) -> Result<Option<Cart>>;

    /// Inserts a brand-new cart. Fails with `Conflict` if the user already
    /// has one.
    async fn insert(&self, cart: &Cart) -> Result<()>;

    /// Replaces the stored cart if it is still at `cart.version()`.
    ///
    /// Returns the new version, or `Conflict` if another writer got there
    /// first.
    async fn save(&self, cart: &Cart) -> Result<Version>;

    /// Same as [`save`](Self::save), and inserts `order` in the same atomic
    /// step.
    async fn save_with_order(&self, cart: &Cart, order: &Order) -> Result<Version>;
}

/// Product lookup used to snapshot name and price into cart lines.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn find_product(&self, product_id: ProductId) -> Result<Option<ProductSnapshot>>;
}
