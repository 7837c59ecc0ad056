//! Shared application state and the backends it can run on.

use std::sync::Arc;

use cart_store::{
    CartStore, InMemoryProductCatalog, InMemoryStore, OptimisticCartStore, OrderStore,
    PostgresStore, ProductCatalog, RetryPolicy,
};
use checkout::ShopService;

/// A set of store types the shop service runs against.
pub trait ShopBackend: Send + Sync + 'static {
    type Carts: CartStore + Clone + 'static;
    type Orders: OrderStore + 'static;
    type Catalog: ProductCatalog + 'static;
}

/// In-process stores; carts use optimistic concurrency.
pub struct InMemoryBackend;

impl ShopBackend for InMemoryBackend {
    type Carts = OptimisticCartStore<InMemoryStore>;
    type Orders = InMemoryStore;
    type Catalog = InMemoryProductCatalog;
}

/// PostgreSQL for carts, orders and the catalog.
pub struct PostgresBackend;

impl ShopBackend for PostgresBackend {
    type Carts = PostgresStore;
    type Orders = PostgresStore;
    type Catalog = PostgresStore;
}

/// Shared application state accessible from all handlers.
pub struct AppState<B: ShopBackend> {
    pub shop: ShopService<B::Carts, B::Orders, B::Catalog>,
}

/// Creates in-memory state; the returned catalog handle stocks products.
pub fn create_in_memory_state(
    policy: RetryPolicy,
) -> (Arc<AppState<InMemoryBackend>>, InMemoryProductCatalog) {
    let repo = InMemoryStore::new();
    let catalog = InMemoryProductCatalog::new();
    let shop = ShopService::new(
        OptimisticCartStore::with_policy(repo.clone(), policy),
        repo,
        catalog.clone(),
        policy,
    );

    (Arc::new(AppState { shop }), catalog)
}

/// Creates state over an already migrated PostgreSQL store.
pub fn create_postgres_state(
    store: PostgresStore,
    policy: RetryPolicy,
) -> Arc<AppState<PostgresBackend>> {
    let shop = ShopService::new(store.clone(), store.clone(), store, policy);
    Arc::new(AppState { shop })
}
