//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container and run serially because
//! each one truncates the shop tables. Run with:
//!
//! ```bash
//! cargo test -p cart-store --test postgres_integration
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use cart_store::{CartStore, OrderStore, PostgresStore, ProductCatalog, StoreError};
use common::{CartId, ProductId, UserId};
use domain::{CartError, MAX_LINE_QUANTITY, Money, Order, OrderStatus, ProductSnapshot};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresStore::new(temp_pool.clone())
                .run_migrations()
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE order_items, orders, cart_items, carts, products")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStore::new(pool)
}

fn product(name: &str, cents: i64) -> ProductSnapshot {
    ProductSnapshot::new(ProductId::new(), name, Money::from_cents(cents)).unwrap()
}

#[tokio::test]
#[serial]
async fn get_or_create_and_find() {
    let store = get_test_store().await;
    let user_id = UserId::new();

    assert!(store.find_cart(user_id).await.unwrap().is_none());

    let created = store.get_or_create_cart(user_id).await.unwrap();
    let again = store.get_or_create_cart(user_id).await.unwrap();

    assert_eq!(created.id(), again.id());
    assert!(created.is_empty());
    assert_eq!(store.find_cart(user_id).await.unwrap().unwrap().id(), created.id());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[serial]
async fn concurrent_first_touch_yields_one_cart() {
    let store = get_test_store().await;
    let user_id = UserId::new();

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.get_or_create_cart(user_id).await })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap().unwrap().id());
    }
    assert_eq!(ids.len(), 1);

    let carts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM carts WHERE user_id = $1")
        .bind(user_id.as_uuid())
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(carts, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[serial]
async fn concurrent_upserts_lose_nothing() {
    let store = get_test_store().await;
    let user_id = UserId::new();
    let cart = store.get_or_create_cart(user_id).await.unwrap();
    let widget = product("Widget", 999);

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let store = store.clone();
            let widget = widget.clone();
            let cart_id = cart.id();
            tokio::spawn(async move { store.upsert_line(cart_id, &widget, 1).await })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cart_items WHERE cart_id = $1")
        .bind(cart.id().as_uuid())
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(rows, 1);

    let cart = store.find_cart(user_id).await.unwrap().unwrap();
    assert_eq!(cart.line(widget.product_id()).unwrap().quantity(), 50);
    assert_eq!(cart.total(), Money::from_cents(999 * 50));
}

#[tokio::test]
#[serial]
async fn upsert_refreshes_name_and_price() {
    let store = get_test_store().await;
    let cart = store.get_or_create_cart(UserId::new()).await.unwrap();
    let widget = product("Widget", 500);

    store.upsert_line(cart.id(), &widget, 2).await.unwrap();
    let renamed =
        ProductSnapshot::new(widget.product_id(), "Widget v2", Money::from_cents(450)).unwrap();
    let line = store.upsert_line(cart.id(), &renamed, 3).await.unwrap().unwrap();

    assert_eq!(line.quantity(), 5);
    assert_eq!(line.name(), "Widget v2");
    assert_eq!(line.line_total(), Money::from_cents(2250));
}

#[tokio::test]
#[serial]
async fn non_positive_delta_is_a_noop() {
    let store = get_test_store().await;
    let cart = store.get_or_create_cart(UserId::new()).await.unwrap();

    assert!(store.upsert_line(cart.id(), &product("A", 1), 0).await.unwrap().is_none());

    let reloaded = store.find_cart(cart.user_id()).await.unwrap().unwrap();
    assert!(reloaded.is_empty());
    assert_eq!(reloaded.version(), cart.version());

    let missing = store.upsert_line(CartId::new(), &product("A", 1), 0).await;
    assert!(matches!(missing, Err(StoreError::NotFound { .. })));
}

#[tokio::test]
#[serial]
async fn set_remove_and_clear() {
    let store = get_test_store().await;
    let cart = store.get_or_create_cart(UserId::new()).await.unwrap();
    let a = product("A", 100);
    let b = product("B", 200);
    let c = product("C", 300);
    for p in [&a, &b, &c] {
        store.upsert_line(cart.id(), p, 1).await.unwrap();
    }

    assert!(store.set_line_quantity(cart.id(), a.product_id(), 4).await.unwrap());
    assert!(!store.set_line_quantity(cart.id(), a.product_id(), 4).await.unwrap());
    assert!(store.set_line_quantity(cart.id(), b.product_id(), -1).await.unwrap());
    assert!(store.remove_line(cart.id(), c.product_id()).await.unwrap());
    assert!(!store.remove_line(cart.id(), c.product_id()).await.unwrap());

    let reloaded = store.find_cart(cart.user_id()).await.unwrap().unwrap();
    assert_eq!(reloaded.line_count(), 1);
    assert_eq!(reloaded.line(a.product_id()).unwrap().quantity(), 4);

    assert_eq!(store.clear_lines(cart.id()).await.unwrap(), 1);
    assert!(store.find_cart(cart.user_id()).await.unwrap().unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn line_limit_matches_the_domain() {
    let store = get_test_store().await;
    let cart = store.get_or_create_cart(UserId::new()).await.unwrap();
    let bolt = product("Bolt", 1);

    store.upsert_line(cart.id(), &bolt, i32::MAX).await.unwrap();
    let before = store.find_cart(cart.user_id()).await.unwrap().unwrap();

    let result = store.upsert_line(cart.id(), &bolt, i32::MAX).await;
    assert!(matches!(
        result,
        Err(StoreError::Cart(CartError::QuantityLimit { .. }))
    ));

    let after = store.find_cart(cart.user_id()).await.unwrap().unwrap();
    assert_eq!(after.line(bolt.product_id()).unwrap().quantity(), MAX_LINE_QUANTITY);
    assert_eq!(after.version(), before.version());

    let order = Order::create_from_lines(after.user_id(), after.line_snapshots()).unwrap();
    store.commit_checkout(&after, &order).await.unwrap();
    let stored = store.find_order(order.id()).await.unwrap().unwrap();
    assert_eq!(stored.lines()[0].quantity(), MAX_LINE_QUANTITY);
}

#[tokio::test]
#[serial]
async fn set_quantity_out_of_range_is_rejected() {
    let store = get_test_store().await;
    let cart = store.get_or_create_cart(UserId::new()).await.unwrap();
    let yacht = product("Yacht", i64::MAX / 2);
    store.upsert_line(cart.id(), &yacht, 1).await.unwrap();

    let result = store.set_line_quantity(cart.id(), yacht.product_id(), 3).await;
    assert!(matches!(
        result,
        Err(StoreError::Cart(CartError::AmountOverflow { .. }))
    ));

    let after = store.find_cart(cart.user_id()).await.unwrap().unwrap();
    assert_eq!(after.line(yacht.product_id()).unwrap().quantity(), 1);
}

#[tokio::test]
#[serial]
async fn checkout_commit_moves_lines_into_order() {
    let store = get_test_store().await;
    let user_id = UserId::new();
    let cart = store.get_or_create_cart(user_id).await.unwrap();
    store.upsert_line(cart.id(), &product("A", 1000), 2).await.unwrap();
    store.upsert_line(cart.id(), &product("B", 500), 1).await.unwrap();

    let loaded = store.find_cart(user_id).await.unwrap().unwrap();
    let order = Order::create_from_lines(user_id, loaded.line_snapshots()).unwrap();
    store.commit_checkout(&loaded, &order).await.unwrap();

    assert!(store.find_cart(user_id).await.unwrap().unwrap().is_empty());

    let stored = store.find_order(order.id()).await.unwrap().unwrap();
    assert_eq!(stored.total(), Money::from_cents(2500));
    assert_eq!(stored.status(), OrderStatus::Pending);
    let names: Vec<&str> = stored.lines().iter().map(|l| l.name()).collect();
    assert_eq!(names, ["A", "B"]);
}

#[tokio::test]
#[serial]
async fn stale_checkout_commit_conflicts_and_writes_nothing() {
    let store = get_test_store().await;
    let user_id = UserId::new();
    let cart = store.get_or_create_cart(user_id).await.unwrap();
    let a = product("A", 1000);
    store.upsert_line(cart.id(), &a, 1).await.unwrap();

    let loaded = store.find_cart(user_id).await.unwrap().unwrap();
    store.upsert_line(cart.id(), &a, 1).await.unwrap();

    let order = Order::create_from_lines(user_id, loaded.line_snapshots()).unwrap();
    let result = store.commit_checkout(&loaded, &order).await;

    assert!(result.unwrap_err().is_conflict());
    assert!(store.find_order(order.id()).await.unwrap().is_none());
    let after = store.find_cart(user_id).await.unwrap().unwrap();
    assert_eq!(after.line(a.product_id()).unwrap().quantity(), 2);
}

#[tokio::test]
#[serial]
async fn order_listing_and_status_update() {
    let store = get_test_store().await;
    let user_id = UserId::new();
    let other = UserId::new();

    let mut placed = Vec::new();
    for owner in [user_id, other, user_id] {
        let cart = store.get_or_create_cart(owner).await.unwrap();
        store.upsert_line(cart.id(), &product("A", 100), 1).await.unwrap();
        let loaded = store.find_cart(owner).await.unwrap().unwrap();
        let order = Order::create_from_lines(owner, loaded.line_snapshots()).unwrap();
        store.commit_checkout(&loaded, &order).await.unwrap();
        placed.push(order);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let mine: Vec<_> = store
        .orders_for_user(user_id)
        .await
        .unwrap()
        .iter()
        .map(Order::id)
        .collect();
    assert_eq!(mine, [placed[2].id(), placed[0].id()]);
    assert_eq!(store.all_orders().await.unwrap().len(), 3);

    let mut order = placed[0].clone();
    order.set_status(OrderStatus::Shipped);
    store.save_order_status(&order).await.unwrap();

    let stored = store.find_order(order.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), OrderStatus::Shipped);
    assert!(stored.updated_at() >= stored.created_at());
}

#[tokio::test]
#[serial]
async fn catalog_lookup() {
    let store = get_test_store().await;
    let widget = product("Widget", 1999);
    store.upsert_product(&widget).await.unwrap();

    assert_eq!(store.find_product(widget.product_id()).await.unwrap(), Some(widget));
    assert_eq!(store.find_product(ProductId::new()).await.unwrap(), None);
}
