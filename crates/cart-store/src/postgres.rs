use std::collections::HashMap;

use async_trait::async_trait;
use common::{CartId, LineItemId, OrderId, ProductId, UserId, Version};
use domain::{Cart, CartLine, Money, Order, OrderLine, OrderStatus, ProductSnapshot};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    retry::{RetryPolicy, retry_on_conflict},
    store::{CartStore, OrderStore, ProductCatalog},
};

// SQLSTATEs that mean "another writer got there first".
const UNIQUE_VIOLATION: &str = "23505";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

const CART_SELECT: &str = r#"
    SELECT c.id, c.user_id, c.version,
           i.id AS item_id, i.product_id, i.name, i.unit_price_cents, i.quantity
    FROM carts c
    LEFT JOIN cart_items i ON i.cart_id = c.id
"#;

const ORDER_SELECT: &str = "SELECT id, user_id, status, created_at, updated_at FROM orders";

/// Maps a driver error, turning write races into `Conflict`.
fn map_db_error(entity: &'static str, id: impl ToString) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| {
        if let sqlx::Error::Database(ref db_err) = e
            && matches!(
                db_err.code().as_deref(),
                Some(UNIQUE_VIOLATION | SERIALIZATION_FAILURE | DEADLOCK_DETECTED)
            )
        {
            return StoreError::conflict(entity, id);
        }
        StoreError::Database(e)
    }
}

fn product_from_row(row: &PgRow, entity: &'static str) -> Result<ProductSnapshot> {
    let product_id = ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?);
    let name: String = row.try_get("name")?;
    let cents: i64 = row.try_get("unit_price_cents")?;
    ProductSnapshot::new(product_id, name, Money::from_cents(cents))
        .map_err(|e| StoreError::corrupt(entity, e.to_string()))
}

fn quantity_from_row(row: &PgRow, entity: &'static str) -> Result<i32> {
    let quantity: i32 = row.try_get("quantity")?;
    if quantity > 0 {
        Ok(quantity)
    } else {
        Err(StoreError::corrupt(entity, format!("quantity {quantity}")))
    }
}

/// Folds the rows of a cart/line join into one cart.
fn cart_from_rows(rows: &[PgRow]) -> Result<Option<Cart>> {
    let Some(first) = rows.first() else {
        return Ok(None);
    };

    let id = CartId::from_uuid(first.try_get("id")?);
    let user_id = UserId::from_uuid(first.try_get("user_id")?);
    let version = Version::new(first.try_get("version")?);

    let mut lines = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(item_id) = row.try_get::<Option<Uuid>, _>("item_id")? else {
            continue;
        };
        lines.push(CartLine::rehydrate(
            LineItemId::from_uuid(item_id),
            product_from_row(row, "cart line")?,
            quantity_from_row(row, "cart line")?,
        ));
    }

    Ok(Some(Cart::rehydrate(id, user_id, version, lines)))
}

fn cart_line_from_row(row: &PgRow) -> Result<CartLine> {
    Ok(CartLine::rehydrate(
        LineItemId::from_uuid(row.try_get("id")?),
        product_from_row(row, "cart line")?,
        quantity_from_row(row, "cart line")?,
    ))
}

/// PostgreSQL-backed cart, order and product store.
///
/// Cart mutations use native upsert (`INSERT .. ON CONFLICT .. DO UPDATE`)
/// inside a transaction that first bumps the cart's version. The bump
/// takes the cart row lock, so writers to one cart are serialized and the
/// version seen by a checkout is exact. Under that lock the change is
/// first applied to the loaded cart, so quantity and total limits are
/// enforced by the domain exactly as in the in-memory store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    policy: RetryPolicy,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self::with_policy(pool, RetryPolicy::default())
    }

    pub fn with_policy(pool: PgPool, policy: RetryPolicy) -> Self {
        Self { pool, policy }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Adds or replaces a catalog product.
    pub async fn upsert_product(&self, product: &ProductSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, unit_price_cents)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, unit_price_cents = EXCLUDED.unit_price_cents
            "#,
        )
        .bind(product.product_id().as_uuid())
        .bind(product.name())
        .bind(product.unit_price().cents())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_cart_by_user(&self, user_id: UserId) -> Result<Option<Cart>> {
        let rows = sqlx::query(&format!(
            "{CART_SELECT} WHERE c.user_id = $1 ORDER BY i.added_at, i.id"
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        cart_from_rows(&rows)
    }

    async fn try_get_or_create(&self, user_id: UserId) -> Result<Cart> {
        sqlx::query("INSERT INTO carts (id, user_id) VALUES ($1, $2) ON CONFLICT (user_id) DO NOTHING")
            .bind(CartId::new().as_uuid())
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(map_db_error("cart", user_id))?;

        self.load_cart_by_user(user_id)
            .await?
            .ok_or_else(|| StoreError::conflict("cart", user_id))
    }

    /// Bumps the cart version inside `tx`, locking the row until commit.
    async fn lock_cart(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        cart_id: CartId,
    ) -> Result<()> {
        let bumped = sqlx::query(
            "UPDATE carts SET version = version + 1, updated_at = NOW() WHERE id = $1",
        )
        .bind(cart_id.as_uuid())
        .execute(&mut **tx)
        .await
        .map_err(map_db_error("cart", cart_id))?;

        if bumped.rows_affected() == 0 {
            return Err(StoreError::not_found("cart", cart_id));
        }
        Ok(())
    }

    /// Loads a cart whose row `tx` already holds locked.
    async fn load_locked_cart(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        cart_id: CartId,
    ) -> Result<Cart> {
        let rows = sqlx::query(&format!(
            "{CART_SELECT} WHERE c.id = $1 ORDER BY i.added_at, i.id"
        ))
        .bind(cart_id.as_uuid())
        .fetch_all(&mut **tx)
        .await?;

        cart_from_rows(&rows)?.ok_or_else(|| StoreError::not_found("cart", cart_id))
    }

    async fn ensure_cart_exists(&self, cart_id: CartId) -> Result<()> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM carts WHERE id = $1)")
            .bind(cart_id.as_uuid())
            .fetch_one(&self.pool)
            .await?;

        if exists {
            Ok(())
        } else {
            Err(StoreError::not_found("cart", cart_id))
        }
    }

    async fn try_upsert_line(
        &self,
        cart_id: CartId,
        product: &ProductSnapshot,
        delta: i32,
    ) -> Result<CartLine> {
        let mut tx = self.pool.begin().await?;
        Self::lock_cart(&mut tx, cart_id).await?;
        Self::load_locked_cart(&mut tx, cart_id)
            .await?
            .add_item(product.clone(), delta)?;

        let row = sqlx::query(
            r#"
            INSERT INTO cart_items (id, cart_id, product_id, name, unit_price_cents, quantity)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (cart_id, product_id) DO UPDATE
            SET quantity = cart_items.quantity + EXCLUDED.quantity,
                name = EXCLUDED.name,
                unit_price_cents = EXCLUDED.unit_price_cents
            RETURNING id, product_id, name, unit_price_cents, quantity
            "#,
        )
        .bind(LineItemId::new().as_uuid())
        .bind(cart_id.as_uuid())
        .bind(product.product_id().as_uuid())
        .bind(product.name())
        .bind(product.unit_price().cents())
        .bind(delta)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_error("cart line", product.product_id()))?;

        let line = cart_line_from_row(&row)?;
        tx.commit().await.map_err(map_db_error("cart", cart_id))?;
        Ok(line)
    }

    async fn try_set_line_quantity(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        Self::lock_cart(&mut tx, cart_id).await?;

        let changed = Self::load_locked_cart(&mut tx, cart_id)
            .await?
            .set_quantity(product_id, quantity)?;
        if !changed {
            tx.rollback().await?;
            return Ok(false);
        }

        let query = if quantity > 0 {
            sqlx::query("UPDATE cart_items SET quantity = $3 WHERE cart_id = $1 AND product_id = $2")
                .bind(cart_id.as_uuid())
                .bind(product_id.as_uuid())
                .bind(quantity)
        } else {
            sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND product_id = $2")
                .bind(cart_id.as_uuid())
                .bind(product_id.as_uuid())
        };
        query
            .execute(&mut *tx)
            .await
            .map_err(map_db_error("cart", cart_id))?;

        tx.commit().await.map_err(map_db_error("cart", cart_id))?;
        Ok(true)
    }

    /// Runs one line-removing statement under the cart lock. Rolls back,
    /// leaving the version alone, when nothing matched.
    async fn try_edit_lines(
        &self,
        cart_id: CartId,
        query: sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        Self::lock_cart(&mut tx, cart_id).await?;

        let affected = query
            .execute(&mut *tx)
            .await
            .map_err(map_db_error("cart", cart_id))?
            .rows_affected();

        if affected > 0 {
            tx.commit().await.map_err(map_db_error("cart", cart_id))?;
        } else {
            tx.rollback().await?;
        }
        Ok(affected)
    }

    async fn try_commit_checkout(&self, cart: &Cart, order: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            "UPDATE carts SET version = version + 1, updated_at = NOW() WHERE id = $1 AND version = $2",
        )
        .bind(cart.id().as_uuid())
        .bind(cart.version().as_i64())
        .execute(&mut *tx)
        .await
        .map_err(map_db_error("cart", cart.id()))?;

        if claimed.rows_affected() == 0 {
            return Err(StoreError::conflict("cart", cart.id()));
        }

        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.user_id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(map_db_error("order", order.id()))?;

        for (position, line) in order.lines().iter().enumerate() {
            let quantity = i32::try_from(line.quantity()).map_err(|_| {
                StoreError::corrupt("order line", format!("quantity {}", line.quantity()))
            })?;
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, position, product_id, name, unit_price_cents, quantity)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(line.id().as_uuid())
            .bind(order.id().as_uuid())
            .bind(position as i32)
            .bind(line.product_id().as_uuid())
            .bind(line.name())
            .bind(line.unit_price().cents())
            .bind(quantity)
            .execute(&mut *tx)
            .await
            .map_err(map_db_error("order", order.id()))?;
        }

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart.id().as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(map_db_error("cart", cart.id()))?;

        tx.commit().await.map_err(map_db_error("cart", cart.id()))?;
        Ok(())
    }

    /// Loads orders matching `filter` (a `WHERE` clause binding at most
    /// `$1`) together with their lines, newest first.
    async fn load_orders(&self, filter: &str, param: Option<Uuid>) -> Result<Vec<Order>> {
        let sql = format!("{ORDER_SELECT} {filter} ORDER BY created_at DESC, id");
        let mut query = sqlx::query(&sql);
        if let Some(param) = param {
            query = query.bind(param);
        }
        let headers = query.fetch_all(&self.pool).await?;

        if headers.is_empty() {
            return Ok(Vec::new());
        }

        let ids = headers
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let item_rows = sqlx::query(
            r#"
            SELECT id, order_id, product_id, name, unit_price_cents, quantity
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, position
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut lines: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
        for row in &item_rows {
            let order_id: Uuid = row.try_get("order_id")?;
            lines.entry(order_id).or_default().push(OrderLine::rehydrate(
                LineItemId::from_uuid(row.try_get("id")?),
                product_from_row(row, "order line")?,
                quantity_from_row(row, "order line")?.unsigned_abs(),
            ));
        }

        headers
            .iter()
            .map(|row| {
                let id: Uuid = row.try_get("id")?;
                let status: OrderStatus = row
                    .try_get::<String, _>("status")?
                    .parse()
                    .map_err(|e: domain::OrderError| StoreError::corrupt("order", e.to_string()))?;

                Ok(Order::rehydrate(
                    OrderId::from_uuid(id),
                    UserId::from_uuid(row.try_get("user_id")?),
                    lines.remove(&id).unwrap_or_default(),
                    status,
                    row.try_get("created_at")?,
                    row.try_get("updated_at")?,
                ))
            })
            .collect()
    }
}

#[async_trait]
impl CartStore for PostgresStore {
    #[tracing::instrument(skip(self))]
    async fn get_or_create_cart(&self, user_id: UserId) -> Result<Cart> {
        retry_on_conflict(
            &self.policy,
            "get_or_create_cart",
            StoreError::is_conflict,
            move || self.try_get_or_create(user_id),
        )
        .await
    }

    async fn find_cart(&self, user_id: UserId) -> Result<Option<Cart>> {
        self.load_cart_by_user(user_id).await
    }

    #[tracing::instrument(skip(self, product), fields(product_id = %product.product_id()))]
    async fn upsert_line(
        &self,
        cart_id: CartId,
        product: &ProductSnapshot,
        delta: i32,
    ) -> Result<Option<CartLine>> {
        if delta <= 0 {
            self.ensure_cart_exists(cart_id).await?;
            return Ok(None);
        }

        let line = retry_on_conflict(
            &self.policy,
            "upsert_line",
            StoreError::is_conflict,
            move || self.try_upsert_line(cart_id, product, delta),
        )
        .await?;
        Ok(Some(line))
    }

    #[tracing::instrument(skip(self))]
    async fn set_line_quantity(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<bool> {
        retry_on_conflict(
            &self.policy,
            "set_line_quantity",
            StoreError::is_conflict,
            move || self.try_set_line_quantity(cart_id, product_id, quantity),
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn remove_line(&self, cart_id: CartId, product_id: ProductId) -> Result<bool> {
        let affected = retry_on_conflict(
            &self.policy,
            "remove_line",
            StoreError::is_conflict,
            move || {
                self.try_edit_lines(
                    cart_id,
                    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND product_id = $2")
                        .bind(cart_id.as_uuid())
                        .bind(product_id.as_uuid()),
                )
            },
        )
        .await?;
        Ok(affected > 0)
    }

    #[tracing::instrument(skip(self))]
    async fn clear_lines(&self, cart_id: CartId) -> Result<usize> {
        let affected = retry_on_conflict(
            &self.policy,
            "clear_lines",
            StoreError::is_conflict,
            move || {
                self.try_edit_lines(
                    cart_id,
                    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1").bind(cart_id.as_uuid()),
                )
            },
        )
        .await?;
        Ok(affected as usize)
    }

    #[tracing::instrument(skip(self, cart, order), fields(cart_id = %cart.id(), order_id = %order.id()))]
    async fn commit_checkout(&self, cart: &Cart, order: &Order) -> Result<()> {
        self.try_commit_checkout(cart, order).await
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let mut orders = self
            .load_orders("WHERE id = $1", Some(order_id.as_uuid()))
            .await?;
        Ok(orders.pop())
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        self.load_orders("WHERE user_id = $1", Some(user_id.as_uuid()))
            .await
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        self.load_orders("", None).await
    }

    #[tracing::instrument(skip(self, order), fields(order_id = %order.id(), status = %order.status()))]
    async fn save_order_status(&self, order: &Order) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE orders SET status = $2, updated_at = GREATEST($3, created_at) WHERE id = $1",
        )
        .bind(order.id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.updated_at())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::not_found("order", order.id()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProductCatalog for PostgresStore {
    async fn find_product(&self, product_id: ProductId) -> Result<Option<ProductSnapshot>> {
        let row = sqlx::query(
            "SELECT id AS product_id, name, unit_price_cents FROM products WHERE id = $1",
        )
        .bind(product_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| product_from_row(&row, "product")).transpose()
    }
}
