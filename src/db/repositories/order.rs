//! Order repository
//!
//! Database operations for orders and their items.
//!
//! Placing an order and cancelling one both touch product stock; each runs in
//! a single transaction so stock and order rows never disagree.

use super::{bind_args, like_pattern, SqlArg, WhereBuilder};
use crate::db::{Backend, DynDatabasePool, InsertId};
use crate::models::{
    ListQuery, NewOrder, Order, OrderItem, OrderStatus, PaymentUpdate, ShippingAddress,
};
use crate::with_backend;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

const ORDER_COLUMNS: &str = r#"
    id, user_id, status, payment_method, payment_status, payment_ref, transaction_id,
    items_total, shipping_fee, total_amount, shipping_name, shipping_phone,
    shipping_address, shipping_city, note, paid_at, delivered_at, created_at, updated_at
"#;

const ORDER_SORTS: &[(&str, &str)] = &[
    ("id", "id"),
    ("status", "status"),
    ("payment_status", "payment_status"),
    ("total_amount", "total_amount"),
    ("created_at", "created_at"),
];

/// Failure writing an order that reserves stock
#[derive(Debug, Error)]
pub enum StockError {
    /// Not enough units left for a line
    #[error("Insufficient stock for product {product_id}")]
    Insufficient { product_id: i64 },

    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

/// Order repository trait
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Reserve stock for every line and persist the order, atomically
    async fn create(&self, order: &NewOrder) -> Result<Order, StockError>;

    /// Get order by ID, with items
    async fn get_by_id(&self, id: i64) -> Result<Option<Order>>;

    /// Get the order a gateway reference was issued for
    async fn get_by_payment_ref(&self, payment_ref: &str) -> Result<Option<Order>>;

    /// List orders with items.
    ///
    /// Filters: `status`, `payment_status`, `payment_method`, `user_id`,
    /// `q` (shipping name or phone), `id` list.
    async fn list(&self, query: &ListQuery) -> Result<(Vec<Order>, i64)>;

    /// A customer's orders, newest first
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Order>>;

    /// Number of orders a customer has placed
    async fn count_for_user(&self, user_id: i64) -> Result<i64>;

    /// Set the fulfilment status; stamps `delivered_at` on delivery
    async fn update_status(&self, id: i64, status: OrderStatus) -> Result<()>;

    /// Mark cancelled and return reserved units to stock, atomically.
    ///
    /// Returns `false` when the order was already cancelled or delivered,
    /// in which case nothing changes.
    async fn cancel(&self, id: i64) -> Result<bool>;

    /// Write payment reconciliation fields
    async fn update_payment(&self, id: i64, update: &PaymentUpdate) -> Result<()>;

    /// Count all orders
    async fn count(&self) -> Result<i64>;

    /// Order counts keyed by status
    async fn count_by_status(&self) -> Result<HashMap<OrderStatus, i64>>;

    /// Sum of `total_amount` over paid orders
    async fn revenue(&self) -> Result<i64>;
}

/// SQLx-based order repository implementation
pub struct SqlxOrderRepository {
    pool: DynDatabasePool,
}

impl SqlxOrderRepository {
    /// Create a new SQLx order repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn OrderRepository> {
        Arc::new(Self::new(pool))
    }

    async fn items_for(&self, ids: &[i64]) -> Result<HashMap<i64, Vec<OrderItem>>> {
        let mut grouped: HashMap<i64, Vec<OrderItem>> = HashMap::new();
        if ids.is_empty() {
            return Ok(grouped);
        }

        let mut filters = WhereBuilder::new();
        filters.push_in("order_id", ids);
        let sql = format!(
            "SELECT id, order_id, product_id, product_name, size, unit_price, quantity, image FROM order_items{} ORDER BY id ASC",
            filters.sql()
        );
        let items = with_backend!(self.pool, db => {
            bind_args!(sqlx::query_as::<_, OrderItem>(&sql), filters.args())
                .fetch_all(db)
                .await
        })
        .context("Failed to load order items")?;

        for item in items {
            grouped.entry(item.order_id).or_default().push(item);
        }
        Ok(grouped)
    }

    async fn hydrate(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>> {
        let mut orders = rows
            .into_iter()
            .map(Order::try_from)
            .collect::<Result<Vec<_>>>()?;
        let ids: Vec<i64> = orders.iter().map(|o| o.id).collect();
        let mut items = self.items_for(&ids).await?;
        for order in &mut orders {
            order.items = items.remove(&order.id).unwrap_or_default();
        }
        Ok(orders)
    }

    async fn fetch_one_where(&self, clause: &str, arg: SqlArg) -> Result<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE {}", ORDER_COLUMNS, clause);
        let args = [arg];
        let row = with_backend!(self.pool, db => {
            bind_args!(sqlx::query_as::<_, OrderRow>(&sql), &args)
                .fetch_optional(db)
                .await
        })
        .context("Failed to get order")?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.into_iter().next()),
            None => Ok(None),
        }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    user_id: i64,
    status: String,
    payment_method: String,
    payment_status: String,
    payment_ref: Option<String>,
    transaction_id: Option<String>,
    items_total: i64,
    shipping_fee: i64,
    total_amount: i64,
    shipping_name: String,
    shipping_phone: String,
    shipping_address: String,
    shipping_city: String,
    note: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = anyhow::Error;

    fn try_from(row: OrderRow) -> Result<Self> {
        Ok(Order {
            id: row.id,
            user_id: row.user_id,
            status: row.status.parse()?,
            payment_method: row.payment_method.parse()?,
            payment_status: row.payment_status.parse()?,
            payment_ref: row.payment_ref,
            transaction_id: row.transaction_id,
            items_total: row.items_total,
            shipping_fee: row.shipping_fee,
            total_amount: row.total_amount,
            shipping: ShippingAddress {
                full_name: row.shipping_name,
                phone: row.shipping_phone,
                address: row.shipping_address,
                city: row.shipping_city,
            },
            note: row.note,
            paid_at: row.paid_at,
            delivered_at: row.delivered_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            items: Vec::new(),
        })
    }
}

fn list_filters(query: &ListQuery) -> WhereBuilder {
    let mut filters = WhereBuilder::new();

    let ids = query.filter_ids();
    if !ids.is_empty() {
        filters.push_in("id", &ids);
    }
    for key in ["status", "payment_status", "payment_method"] {
        if let Some(value) = query.filter_str(key) {
            filters.push(format!("{} = ?", key), [SqlArg::Text(value.to_lowercase())]);
        }
    }
    if let Some(user_id) = query.filter_i64("user_id") {
        filters.push("user_id = ?", [SqlArg::Int(user_id)]);
    }
    if let Some(q) = query.filter_str("q") {
        let pattern = like_pattern(&q);
        filters.push(
            "(shipping_name LIKE ? ESCAPE '!' OR shipping_phone LIKE ? ESCAPE '!')",
            [SqlArg::Text(pattern.clone()), SqlArg::Text(pattern)],
        );
    }

    filters
}

#[async_trait]
impl OrderRepository for SqlxOrderRepository {
    async fn create(&self, order: &NewOrder) -> Result<Order, StockError> {
        let now = Utc::now();

        let id = with_backend!(self.pool, db => {
            let mut tx = db.begin().await.context("Failed to begin order transaction")?;

            for item in &order.items {
                let reserved = sqlx::query(
                    "UPDATE products SET stock = stock - ?, updated_at = ? WHERE id = ? AND stock >= ?",
                )
                .bind(item.quantity)
                .bind(now)
                .bind(item.product_id)
                .bind(item.quantity)
                .execute(&mut *tx)
                .await
                .context("Failed to reserve stock")?
                .rows_affected();

                if reserved == 0 {
                    tx.rollback().await.context("Failed to roll back order")?;
                    return Err(StockError::Insufficient {
                        product_id: item.product_id,
                    });
                }
            }

            let order_id = sqlx::query(
                r#"
                INSERT INTO orders (user_id, status, payment_method, payment_status, items_total,
                    shipping_fee, total_amount, shipping_name, shipping_phone, shipping_address,
                    shipping_city, note, created_at, updated_at)
                VALUES (?, 'pending', ?, 'unpaid', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(order.user_id)
            .bind(order.payment_method.to_string())
            .bind(order.items_total)
            .bind(order.shipping_fee)
            .bind(order.total_amount)
            .bind(&order.shipping.full_name)
            .bind(&order.shipping.phone)
            .bind(&order.shipping.address)
            .bind(&order.shipping.city)
            .bind(&order.note)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("Failed to insert order")?
            .insert_id();

            for item in &order.items {
                sqlx::query(
                    r#"
                    INSERT INTO order_items (order_id, product_id, product_name, size, unit_price, quantity, image)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(order_id)
                .bind(item.product_id)
                .bind(&item.product_name)
                .bind(&item.size)
                .bind(item.unit_price)
                .bind(item.quantity)
                .bind(&item.image)
                .execute(&mut *tx)
                .await
                .context("Failed to insert order item")?;
            }

            tx.commit().await.context("Failed to commit order")?;
            order_id
        });

        let created = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Order not found after insert"))?;
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Order>> {
        self.fetch_one_where("id = ?", SqlArg::Int(id)).await
    }

    async fn get_by_payment_ref(&self, payment_ref: &str) -> Result<Option<Order>> {
        self.fetch_one_where("payment_ref = ?", SqlArg::Text(payment_ref.to_string()))
            .await
    }

    async fn list(&self, query: &ListQuery) -> Result<(Vec<Order>, i64)> {
        let filters = list_filters(query);
        let order_by = query.order_by(ORDER_SORTS, "created_at DESC");

        let sql = format!(
            "SELECT {} FROM orders{} ORDER BY {}, id DESC LIMIT ? OFFSET ?",
            ORDER_COLUMNS,
            filters.sql(),
            order_by
        );
        let count_sql = format!("SELECT COUNT(*) FROM orders{}", filters.sql());

        let (rows, total) = with_backend!(self.pool, db => {
            let rows = bind_args!(sqlx::query_as::<_, OrderRow>(&sql), filters.args())
                .bind(query.limit)
                .bind(query.offset)
                .fetch_all(db)
                .await;
            let total = bind_args!(sqlx::query_scalar::<_, i64>(&count_sql), filters.args())
                .fetch_one(db)
                .await;
            (rows, total)
        });

        let orders = self.hydrate(rows.context("Failed to list orders")?).await?;
        Ok((orders, total.context("Failed to count orders")?))
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Order>> {
        let sql = format!(
            "SELECT {} FROM orders WHERE user_id = ? ORDER BY created_at DESC, id DESC",
            ORDER_COLUMNS
        );
        let rows = with_backend!(self.pool, db => {
            sqlx::query_as::<_, OrderRow>(&sql).bind(user_id).fetch_all(db).await
        })
        .context("Failed to list user orders")?;

        self.hydrate(rows).await
    }

    async fn count_for_user(&self, user_id: i64) -> Result<i64> {
        let count = with_backend!(self.pool, db => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(db)
                .await
        })
        .context("Failed to count user orders")?;
        Ok(count)
    }

    async fn update_status(&self, id: i64, status: OrderStatus) -> Result<()> {
        let now = Utc::now();
        let delivered_at = (status == OrderStatus::Delivered).then_some(now);

        with_backend!(self.pool, db => {
            sqlx::query(
                "UPDATE orders SET status = ?, delivered_at = COALESCE(?, delivered_at), updated_at = ? WHERE id = ?",
            )
            .bind(status.to_string())
            .bind(delivered_at)
            .bind(now)
            .bind(id)
            .execute(db)
            .await
            .map(|_| ())
        })
        .context("Failed to update order status")?;
        Ok(())
    }

    async fn cancel(&self, id: i64) -> Result<bool> {
        let now = Utc::now();

        let cancelled = with_backend!(self.pool, db => {
            let mut tx = db.begin().await.context("Failed to begin cancel transaction")?;

            // claim the order first; a concurrent cancel sees 0 rows and
            // leaves stock alone
            let claimed = sqlx::query(
                "UPDATE orders SET status = 'cancelled', updated_at = ? \
                 WHERE id = ? AND status NOT IN ('cancelled', 'delivered')",
            )
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to cancel order")?
            .rows_affected();

            if claimed == 1 {
                let lines: Vec<(Option<i64>, i64)> =
                    sqlx::query_as("SELECT product_id, quantity FROM order_items WHERE order_id = ?")
                        .bind(id)
                        .fetch_all(&mut *tx)
                        .await
                        .context("Failed to load order items")?;

                for (product_id, quantity) in lines {
                    let Some(product_id) = product_id else { continue };
                    sqlx::query("UPDATE products SET stock = stock + ?, updated_at = ? WHERE id = ?")
                        .bind(quantity)
                        .bind(now)
                        .bind(product_id)
                        .execute(&mut *tx)
                        .await
                        .context("Failed to restore stock")?;
                }
            }

            tx.commit().await.context("Failed to commit cancel")?;
            claimed == 1
        });
        Ok(cancelled)
    }

    async fn update_payment(&self, id: i64, update: &PaymentUpdate) -> Result<()> {
        with_backend!(self.pool, db => {
            sqlx::query(
                r#"
                UPDATE orders
                SET payment_status = ?, payment_ref = COALESCE(?, payment_ref),
                    transaction_id = COALESCE(?, transaction_id),
                    paid_at = COALESCE(?, paid_at), updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(update.payment_status.to_string())
            .bind(&update.payment_ref)
            .bind(&update.transaction_id)
            .bind(update.paid_at)
            .bind(Utc::now())
            .bind(id)
            .execute(db)
            .await
            .map(|_| ())
        })
        .context("Failed to update order payment")?;
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let count = with_backend!(self.pool, db => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders").fetch_one(db).await
        })
        .context("Failed to count orders")?;
        Ok(count)
    }

    async fn count_by_status(&self) -> Result<HashMap<OrderStatus, i64>> {
        let rows: Vec<(String, i64)> = with_backend!(self.pool, db => {
            sqlx::query_as("SELECT status, COUNT(*) FROM orders GROUP BY status")
                .fetch_all(db)
                .await
        })
        .context("Failed to count orders by status")?;

        rows.into_iter()
            .map(|(status, count)| Ok((status.parse::<OrderStatus>()?, count)))
            .collect()
    }

    async fn revenue(&self) -> Result<i64> {
        // SUM over BIGINT is DECIMAL on MySQL
        let total = match self.pool.backend() {
            Backend::Sqlite(db) => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT COALESCE(SUM(total_amount), 0) FROM orders WHERE payment_status = 'paid'",
                )
                .fetch_one(db)
                .await
            }
            Backend::Mysql(db) => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT CAST(COALESCE(SUM(total_amount), 0) AS SIGNED) FROM orders WHERE payment_status = 'paid'",
                )
                .fetch_one(db)
                .await
            }
        }
        .context("Failed to sum revenue")?;
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations::run_migrations, DatabasePool};
    use crate::models::{NewOrderItem, PaymentMethod, PaymentStatus};

    async fn setup() -> (DynDatabasePool, SqlxOrderRepository) {
        let pool = create_test_pool().await.expect("Failed to create pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        for sql in [
            "INSERT INTO users (id, name, email, password_hash) VALUES (1, 'Ram', 'ram@example.com', 'h')",
            "INSERT INTO products (id, name, slug, price, stock, sizes) VALUES (10, 'Home Kit', 'home-kit', 250000, 3, ',M,')",
            "INSERT INTO products (id, name, slug, price, stock, sizes) VALUES (11, 'Away Kit', 'away-kit', 200000, 1, ',M,')",
        ] {
            pool.execute(sql).await.expect("Failed to seed");
        }
        (pool.clone(), SqlxOrderRepository::new(pool))
    }

    fn new_order(lines: &[(i64, i64, i64)]) -> NewOrder {
        let items: Vec<NewOrderItem> = lines
            .iter()
            .map(|(product_id, price, quantity)| NewOrderItem {
                product_id: *product_id,
                product_name: format!("Product {}", product_id),
                size: "M".to_string(),
                unit_price: *price,
                quantity: *quantity,
                image: None,
            })
            .collect();
        let items_total = items.iter().map(|i| i.unit_price * i.quantity).sum();
        NewOrder {
            user_id: 1,
            payment_method: PaymentMethod::Esewa,
            items_total,
            shipping_fee: 10_000,
            total_amount: items_total + 10_000,
            shipping: ShippingAddress {
                full_name: "Ram Thapa".to_string(),
                phone: "9800000000".to_string(),
                address: "Lakeside".to_string(),
                city: "Pokhara".to_string(),
            },
            note: None,
            items,
        }
    }

    async fn stock_of(pool: &DynDatabasePool, id: i64) -> i64 {
        with_backend!(pool, db => {
            sqlx::query_scalar::<_, i64>("SELECT stock FROM products WHERE id = ?")
                .bind(id)
                .fetch_one(db)
                .await
                .unwrap()
        })
    }

    #[tokio::test]
    async fn test_create_reserves_stock() {
        let (pool, repo) = setup().await;
        let order = repo
            .create(&new_order(&[(10, 250_000, 2), (11, 200_000, 1)]))
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Unpaid);
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.total_amount, 710_000);
        assert_eq!(order.shipping.city, "Pokhara");

        assert_eq!(stock_of(&pool, 10).await, 1);
        assert_eq!(stock_of(&pool, 11).await, 0);
    }

    #[tokio::test]
    async fn test_create_rolls_back_on_insufficient_stock() {
        let (pool, repo) = setup().await;
        let result = repo
            .create(&new_order(&[(10, 250_000, 1), (11, 200_000, 2)]))
            .await;

        assert!(matches!(
            result,
            Err(StockError::Insufficient { product_id: 11 })
        ));
        assert_eq!(stock_of(&pool, 10).await, 3);
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancel_restores_stock() {
        let (pool, repo) = setup().await;
        let order = repo.create(&new_order(&[(10, 250_000, 2)])).await.unwrap();
        assert_eq!(stock_of(&pool, 10).await, 1);

        assert!(repo.cancel(order.id).await.unwrap());
        let cancelled = repo.get_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(stock_of(&pool, 10).await, 3);
    }

    #[tokio::test]
    async fn test_cancel_twice_restores_stock_once() {
        let (pool, repo) = setup().await;
        let order = repo.create(&new_order(&[(10, 250_000, 2)])).await.unwrap();

        assert!(repo.cancel(order.id).await.unwrap());
        assert!(!repo.cancel(order.id).await.unwrap());
        assert_eq!(stock_of(&pool, 10).await, 3);
    }

    #[tokio::test]
    async fn test_cancel_skips_delivered_order() {
        let (pool, repo) = setup().await;
        let order = repo.create(&new_order(&[(10, 250_000, 2)])).await.unwrap();
        repo.update_status(order.id, OrderStatus::Delivered)
            .await
            .unwrap();

        assert!(!repo.cancel(order.id).await.unwrap());
        let order = repo.get_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);
        assert_eq!(stock_of(&pool, 10).await, 1);
    }

    #[tokio::test]
    async fn test_payment_update_and_lookup_by_ref() {
        let (_pool, repo) = setup().await;
        let order = repo.create(&new_order(&[(10, 250_000, 1)])).await.unwrap();

        repo.update_payment(
            order.id,
            &PaymentUpdate {
                payment_status: PaymentStatus::Pending,
                payment_ref: Some("JN-1-261018120000".to_string()),
                transaction_id: None,
                paid_at: None,
            },
        )
        .await
        .unwrap();

        let found = repo
            .get_by_payment_ref("JN-1-261018120000")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, order.id);
        assert_eq!(found.payment_status, PaymentStatus::Pending);

        repo.update_payment(
            order.id,
            &PaymentUpdate {
                payment_status: PaymentStatus::Paid,
                payment_ref: None,
                transaction_id: Some("000AWEO".to_string()),
                paid_at: Some(Utc::now()),
            },
        )
        .await
        .unwrap();

        let paid = repo.get_by_id(order.id).await.unwrap().unwrap();
        assert!(paid.is_paid());
        assert_eq!(paid.payment_ref.as_deref(), Some("JN-1-261018120000"));
        assert_eq!(paid.transaction_id.as_deref(), Some("000AWEO"));
        assert_eq!(repo.revenue().await.unwrap(), 260_000);
    }

    #[tokio::test]
    async fn test_status_list_and_counts() {
        let (_pool, repo) = setup().await;
        let first = repo.create(&new_order(&[(10, 250_000, 1)])).await.unwrap();
        repo.create(&new_order(&[(10, 250_000, 1)])).await.unwrap();

        repo.update_status(first.id, OrderStatus::Delivered).await.unwrap();
        let delivered = repo.get_by_id(first.id).await.unwrap().unwrap();
        assert!(delivered.delivered_at.is_some());

        let (pending, total) = repo
            .list(&ListQuery::default().with_filter("status", "pending"))
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(pending[0].items.len(), 1);

        let counts = repo.count_by_status().await.unwrap();
        assert_eq!(counts.get(&OrderStatus::Delivered), Some(&1));
        assert_eq!(repo.count_for_user(1).await.unwrap(), 2);
        assert_eq!(repo.list_for_user(1).await.unwrap().len(), 2);
    }
}
