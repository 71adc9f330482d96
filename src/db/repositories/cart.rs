//! Cart repository
//!
//! Database operations for per-user cart lines.

use crate::db::{DynDatabasePool, InsertId};
use crate::models::{CartItem, CartLine};
use crate::with_backend;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

const CART_ITEM_COLUMNS: &str = "id, user_id, product_id, size, quantity, created_at, updated_at";

/// Cart lines joined with the product's live name, price, stock and first image
const CART_LINES_SQL: &str = r#"
    SELECT ci.id, ci.product_id, p.name, p.slug,
        (SELECT pi.url FROM product_images pi WHERE pi.product_id = p.id
            ORDER BY pi.sort_order ASC, pi.id ASC LIMIT 1) AS image,
        ci.size, p.price AS unit_price, ci.quantity, p.stock
    FROM cart_items ci
    INNER JOIN products p ON p.id = ci.product_id
    WHERE ci.user_id = ?
    ORDER BY ci.created_at ASC, ci.id ASC
"#;

/// Cart repository trait
#[async_trait]
pub trait CartRepository: Send + Sync {
    /// The user's cart lines with product data
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<CartLine>>;

    /// Get a cart item by ID, scoped to its owner
    async fn get_item(&self, user_id: i64, item_id: i64) -> Result<Option<CartItem>>;

    /// Find the line for a product and size
    async fn find_item(&self, user_id: i64, product_id: i64, size: &str) -> Result<Option<CartItem>>;

    /// Insert a new line
    async fn insert_item(&self, user_id: i64, product_id: i64, size: &str, quantity: i64) -> Result<CartItem>;

    /// Set a line's quantity
    async fn update_quantity(&self, item_id: i64, quantity: i64) -> Result<()>;

    /// Remove a line; false if it isn't the user's
    async fn delete_item(&self, user_id: i64, item_id: i64) -> Result<bool>;

    /// Empty the user's cart
    async fn clear(&self, user_id: i64) -> Result<u64>;
}

/// SQLx-based cart repository implementation
pub struct SqlxCartRepository {
    pool: DynDatabasePool,
}

impl SqlxCartRepository {
    /// Create a new SQLx cart repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CartRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CartRepository for SqlxCartRepository {
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<CartLine>> {
        let lines = with_backend!(self.pool, db => {
            sqlx::query_as::<_, CartLine>(CART_LINES_SQL)
                .bind(user_id)
                .fetch_all(db)
                .await
        })
        .context("Failed to load cart")?;
        Ok(lines)
    }

    async fn get_item(&self, user_id: i64, item_id: i64) -> Result<Option<CartItem>> {
        let sql = format!(
            "SELECT {} FROM cart_items WHERE id = ? AND user_id = ?",
            CART_ITEM_COLUMNS
        );
        let item = with_backend!(self.pool, db => {
            sqlx::query_as::<_, CartItem>(&sql)
                .bind(item_id)
                .bind(user_id)
                .fetch_optional(db)
                .await
        })
        .context("Failed to get cart item")?;
        Ok(item)
    }

    async fn find_item(&self, user_id: i64, product_id: i64, size: &str) -> Result<Option<CartItem>> {
        let sql = format!(
            "SELECT {} FROM cart_items WHERE user_id = ? AND product_id = ? AND size = ?",
            CART_ITEM_COLUMNS
        );
        let item = with_backend!(self.pool, db => {
            sqlx::query_as::<_, CartItem>(&sql)
                .bind(user_id)
                .bind(product_id)
                .bind(size)
                .fetch_optional(db)
                .await
        })
        .context("Failed to find cart item")?;
        Ok(item)
    }

    async fn insert_item(&self, user_id: i64, product_id: i64, size: &str, quantity: i64) -> Result<CartItem> {
        let now = Utc::now();
        let id = with_backend!(self.pool, db => {
            sqlx::query(
                "INSERT INTO cart_items (user_id, product_id, size, quantity, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(user_id)
            .bind(product_id)
            .bind(size)
            .bind(quantity)
            .bind(now)
            .bind(now)
            .execute(db)
            .await
            .map(|r| r.insert_id())
        })
        .context("Failed to add cart item")?;

        Ok(CartItem {
            id,
            user_id,
            product_id,
            size: size.to_string(),
            quantity,
            created_at: now,
            updated_at: now,
        })
    }

    async fn update_quantity(&self, item_id: i64, quantity: i64) -> Result<()> {
        with_backend!(self.pool, db => {
            sqlx::query("UPDATE cart_items SET quantity = ?, updated_at = ? WHERE id = ?")
                .bind(quantity)
                .bind(Utc::now())
                .bind(item_id)
                .execute(db)
                .await
                .map(|_| ())
        })
        .context("Failed to update cart item")?;
        Ok(())
    }

    async fn delete_item(&self, user_id: i64, item_id: i64) -> Result<bool> {
        let affected = with_backend!(self.pool, db => {
            sqlx::query("DELETE FROM cart_items WHERE id = ? AND user_id = ?")
                .bind(item_id)
                .bind(user_id)
                .execute(db)
                .await
                .map(|r| r.rows_affected())
        })
        .context("Failed to remove cart item")?;
        Ok(affected > 0)
    }

    async fn clear(&self, user_id: i64) -> Result<u64> {
        let affected = with_backend!(self.pool, db => {
            sqlx::query("DELETE FROM cart_items WHERE user_id = ?")
                .bind(user_id)
                .execute(db)
                .await
                .map(|r| r.rows_affected())
        })
        .context("Failed to clear cart")?;
        Ok(affected)
    }
}
