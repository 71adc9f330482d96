//! Review repository
//!
//! Database operations for product reviews.

use super::{bind_args, like_pattern, SqlArg, WhereBuilder};
use crate::db::{DynDatabasePool, InsertId};
use crate::models::{ListQuery, Review};
use crate::with_backend;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

const REVIEW_COLUMNS: &str =
    "id, product_id, user_id, user_name, rating, comment, created_at, updated_at";

const REVIEW_SORTS: &[(&str, &str)] = &[
    ("id", "id"),
    ("rating", "rating"),
    ("product_id", "product_id"),
    ("created_at", "created_at"),
];

/// Review repository trait
#[async_trait]
pub trait ReviewRepository: Send + Sync {
    /// Create a new review
    async fn create(&self, review: &Review) -> Result<Review>;

    /// Get review by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Review>>;

    /// The review a user left on a product, if any
    async fn get_by_product_and_user(&self, product_id: i64, user_id: i64) -> Result<Option<Review>>;

    /// List reviews. Filters: `product_id`, `user_id`, `rating`, `q` (comment), `id` list.
    async fn list(&self, query: &ListQuery) -> Result<(Vec<Review>, i64)>;

    /// Update rating and comment
    async fn update(&self, review: &Review) -> Result<Review>;

    /// Delete a review
    async fn delete(&self, id: i64) -> Result<()>;

    /// All ratings left on a product
    async fn ratings_for_product(&self, product_id: i64) -> Result<Vec<i64>>;
}

/// SQLx-based review repository implementation
pub struct SqlxReviewRepository {
    pool: DynDatabasePool,
}

impl SqlxReviewRepository {
    /// Create a new SQLx review repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ReviewRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ReviewRepository for SqlxReviewRepository {
    async fn create(&self, review: &Review) -> Result<Review> {
        let now = Utc::now();
        let id = with_backend!(self.pool, db => {
            sqlx::query(
                r#"
                INSERT INTO reviews (product_id, user_id, user_name, rating, comment, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(review.product_id)
            .bind(review.user_id)
            .bind(&review.user_name)
            .bind(review.rating)
            .bind(&review.comment)
            .bind(now)
            .bind(now)
            .execute(db)
            .await
            .map(|r| r.insert_id())
        })
        .context("Failed to create review")?;

        Ok(Review {
            id,
            created_at: now,
            updated_at: now,
            ..review.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Review>> {
        let sql = format!("SELECT {} FROM reviews WHERE id = ?", REVIEW_COLUMNS);
        let review = with_backend!(self.pool, db => {
            sqlx::query_as::<_, Review>(&sql).bind(id).fetch_optional(db).await
        })
        .context("Failed to get review")?;
        Ok(review)
    }

    async fn get_by_product_and_user(&self, product_id: i64, user_id: i64) -> Result<Option<Review>> {
        let sql = format!(
            "SELECT {} FROM reviews WHERE product_id = ? AND user_id = ?",
            REVIEW_COLUMNS
        );
        let review = with_backend!(self.pool, db => {
            sqlx::query_as::<_, Review>(&sql)
                .bind(product_id)
                .bind(user_id)
                .fetch_optional(db)
                .await
        })
        .context("Failed to get review")?;
        Ok(review)
    }

    async fn list(&self, query: &ListQuery) -> Result<(Vec<Review>, i64)> {
        let mut filters = WhereBuilder::new();
        let ids = query.filter_ids();
        if !ids.is_empty() {
            filters.push_in("id", &ids);
        }
        for key in ["product_id", "user_id", "rating"] {
            if let Some(value) = query.filter_i64(key) {
                filters.push(format!("{} = ?", key), [SqlArg::Int(value)]);
            }
        }
        if let Some(q) = query.filter_str("q") {
            filters.push("comment LIKE ? ESCAPE '!'", [SqlArg::Text(like_pattern(&q))]);
        }

        let order_by = query.order_by(REVIEW_SORTS, "created_at DESC");
        let sql = format!(
            "SELECT {} FROM reviews{} ORDER BY {}, id DESC LIMIT ? OFFSET ?",
            REVIEW_COLUMNS,
            filters.sql(),
            order_by
        );
        let count_sql = format!("SELECT COUNT(*) FROM reviews{}", filters.sql());

        let (rows, total) = with_backend!(self.pool, db => {
            let rows = bind_args!(sqlx::query_as::<_, Review>(&sql), filters.args())
                .bind(query.limit)
                .bind(query.offset)
                .fetch_all(db)
                .await;
            let total = bind_args!(sqlx::query_scalar::<_, i64>(&count_sql), filters.args())
                .fetch_one(db)
                .await;
            (rows, total)
        });

        Ok((
            rows.context("Failed to list reviews")?,
            total.context("Failed to count reviews")?,
        ))
    }

    async fn update(&self, review: &Review) -> Result<Review> {
        let now = Utc::now();
        with_backend!(self.pool, db => {
            sqlx::query("UPDATE reviews SET rating = ?, comment = ?, updated_at = ? WHERE id = ?")
                .bind(review.rating)
                .bind(&review.comment)
                .bind(now)
                .bind(review.id)
                .execute(db)
                .await
                .map(|_| ())
        })
        .context("Failed to update review")?;

        Ok(Review {
            updated_at: now,
            ..review.clone()
        })
    }

    async fn delete(&self, id: i64) -> Result<()> {
        with_backend!(self.pool, db => {
            sqlx::query("DELETE FROM reviews WHERE id = ?").bind(id).execute(db).await.map(|_| ())
        })
        .context("Failed to delete review")?;
        Ok(())
    }

    async fn ratings_for_product(&self, product_id: i64) -> Result<Vec<i64>> {
        let ratings = with_backend!(self.pool, db => {
            sqlx::query_scalar::<_, i64>("SELECT rating FROM reviews WHERE product_id = ?")
                .bind(product_id)
                .fetch_all(db)
                .await
        })
        .context("Failed to load product ratings")?;
        Ok(ratings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations::run_migrations, DatabasePool};

    async fn setup() -> SqlxReviewRepository {
        let pool = create_test_pool().await.expect("Failed to create pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        for sql in [
            "INSERT INTO users (id, name, email, password_hash) VALUES (1, 'Ram', 'ram@example.com', 'h')",
            "INSERT INTO users (id, name, email, password_hash) VALUES (2, 'Sita', 'sita@example.com', 'h')",
            "INSERT INTO products (id, name, slug, price) VALUES (10, 'Home Kit', 'home-kit', 250000)",
        ] {
            pool.execute(sql).await.expect("Failed to seed");
        }
        SqlxReviewRepository::new(pool)
    }

    fn review(user_id: i64, rating: i64, comment: &str) -> Review {
        let now = Utc::now();
        Review {
            id: 0,
            product_id: 10,
            user_id,
            user_name: format!("User {}", user_id),
            rating,
            comment: comment.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_one_review_per_user_and_product() {
        let repo = setup().await;
        let created = repo.create(&review(1, 5, "Great fit")).await.unwrap();
        assert!(created.id > 0);
        assert!(repo.create(&review(1, 4, "Again")).await.is_err());

        let found = repo.get_by_product_and_user(10, 1).await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert!(repo.get_by_product_and_user(10, 2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ratings_and_filters() {
        let repo = setup().await;
        repo.create(&review(1, 5, "Great fit")).await.unwrap();
        repo.create(&review(2, 3, "Runs small")).await.unwrap();

        let mut ratings = repo.ratings_for_product(10).await.unwrap();
        ratings.sort();
        assert_eq!(ratings, vec![3, 5]);

        let (found, total) = repo
            .list(&ListQuery::default().with_filter("q", "small"))
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(found[0].user_id, 2);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let repo = setup().await;
        let mut created = repo.create(&review(1, 5, "Great")).await.unwrap();
        created.rating = 4;
        repo.update(&created).await.unwrap();
        assert_eq!(repo.get_by_id(created.id).await.unwrap().unwrap().rating, 4);

        repo.delete(created.id).await.unwrap();
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
    }
}
