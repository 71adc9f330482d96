//! Category repository
//!
//! Database operations for product categories.
//!
//! This module provides:
//! - `CategoryRepository` trait defining the interface for category data access
//! - `SqlxCategoryRepository` implementing the trait for SQLite and MySQL

use super::{bind_args, like_pattern, SqlArg, WhereBuilder};
use crate::db::{DynDatabasePool, InsertId};
use crate::models::{Category, ListQuery};
use crate::with_backend;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

const CATEGORY_COLUMNS: &str = "id, name, slug, description, image, created_at, updated_at";

const CATEGORY_SORTS: &[(&str, &str)] = &[
    ("id", "id"),
    ("name", "name"),
    ("slug", "slug"),
    ("created_at", "created_at"),
];

/// Category repository trait
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Create a new category
    async fn create(&self, category: &Category) -> Result<Category>;

    /// Get category by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    /// Get category by slug
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    /// List categories. Filters: `q` (name), `id` list.
    async fn list(&self, query: &ListQuery) -> Result<(Vec<Category>, i64)>;

    /// All categories ordered by name
    async fn list_all(&self) -> Result<Vec<Category>>;

    /// Update a category
    async fn update(&self, category: &Category) -> Result<Category>;

    /// Delete a category
    async fn delete(&self, id: i64) -> Result<()>;

    /// Check if a name is taken (case-insensitive)
    async fn exists_by_name(&self, name: &str) -> Result<bool>;

    /// Check if a slug is taken
    async fn exists_by_slug(&self, slug: &str) -> Result<bool>;

    /// Number of products in the category
    async fn count_products(&self, id: i64) -> Result<i64>;
}

/// SQLx-based category repository implementation
pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    /// Create a new SQLx category repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, category: &Category) -> Result<Category> {
        let now = Utc::now();
        let id = with_backend!(self.pool, db => {
            sqlx::query(
                "INSERT INTO categories (name, slug, description, image, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&category.name)
            .bind(&category.slug)
            .bind(&category.description)
            .bind(&category.image)
            .bind(now)
            .bind(now)
            .execute(db)
            .await
            .map(|r| r.insert_id())
        })
        .context("Failed to create category")?;

        Ok(Category {
            id,
            created_at: now,
            updated_at: now,
            ..category.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        let sql = format!("SELECT {} FROM categories WHERE id = ?", CATEGORY_COLUMNS);
        let category = with_backend!(self.pool, db => {
            sqlx::query_as::<_, Category>(&sql).bind(id).fetch_optional(db).await
        })
        .context("Failed to get category by ID")?;
        Ok(category)
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let sql = format!("SELECT {} FROM categories WHERE slug = ?", CATEGORY_COLUMNS);
        let category = with_backend!(self.pool, db => {
            sqlx::query_as::<_, Category>(&sql).bind(slug).fetch_optional(db).await
        })
        .context("Failed to get category by slug")?;
        Ok(category)
    }

    async fn list(&self, query: &ListQuery) -> Result<(Vec<Category>, i64)> {
        let mut filters = WhereBuilder::new();
        let ids = query.filter_ids();
        if !ids.is_empty() {
            filters.push_in("id", &ids);
        }
        if let Some(q) = query.filter_str("q") {
            filters.push("name LIKE ? ESCAPE '!'", [SqlArg::Text(like_pattern(&q))]);
        }

        let order_by = query.order_by(CATEGORY_SORTS, "name ASC");
        let sql = format!(
            "SELECT {} FROM categories{} ORDER BY {}, id ASC LIMIT ? OFFSET ?",
            CATEGORY_COLUMNS,
            filters.sql(),
            order_by
        );
        let count_sql = format!("SELECT COUNT(*) FROM categories{}", filters.sql());

        let (rows, total) = with_backend!(self.pool, db => {
            let rows = bind_args!(sqlx::query_as::<_, Category>(&sql), filters.args())
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
            rows.context("Failed to list categories")?,
            total.context("Failed to count categories")?,
        ))
    }

    async fn list_all(&self) -> Result<Vec<Category>> {
        let sql = format!("SELECT {} FROM categories ORDER BY name ASC", CATEGORY_COLUMNS);
        let categories = with_backend!(self.pool, db => {
            sqlx::query_as::<_, Category>(&sql).fetch_all(db).await
        })
        .context("Failed to list categories")?;
        Ok(categories)
    }

    async fn update(&self, category: &Category) -> Result<Category> {
        let now = Utc::now();
        with_backend!(self.pool, db => {
            sqlx::query(
                "UPDATE categories SET name = ?, slug = ?, description = ?, image = ?, updated_at = ? WHERE id = ?",
            )
            .bind(&category.name)
            .bind(&category.slug)
            .bind(&category.description)
            .bind(&category.image)
            .bind(now)
            .bind(category.id)
            .execute(db)
            .await
            .map(|_| ())
        })
        .context("Failed to update category")?;

        Ok(Category {
            updated_at: now,
            ..category.clone()
        })
    }

    async fn delete(&self, id: i64) -> Result<()> {
        with_backend!(self.pool, db => {
            sqlx::query("DELETE FROM categories WHERE id = ?").bind(id).execute(db).await.map(|_| ())
        })
        .context("Failed to delete category")?;
        Ok(())
    }

    async fn exists_by_name(&self, name: &str) -> Result<bool> {
        let count = with_backend!(self.pool, db => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM categories WHERE LOWER(name) = LOWER(?)")
                .bind(name)
                .fetch_one(db)
                .await
        })
        .context("Failed to check category name")?;
        Ok(count > 0)
    }

    async fn exists_by_slug(&self, slug: &str) -> Result<bool> {
        let count = with_backend!(self.pool, db => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM categories WHERE slug = ?")
                .bind(slug)
                .fetch_one(db)
                .await
        })
        .context("Failed to check category slug")?;
        Ok(count > 0)
    }

    async fn count_products(&self, id: i64) -> Result<i64> {
        let count = with_backend!(self.pool, db => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products WHERE category_id = ?")
                .bind(id)
                .fetch_one(db)
                .await
        })
        .context("Failed to count category products")?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations::run_migrations, DatabasePool};

    async fn setup() -> (DynDatabasePool, SqlxCategoryRepository) {
        let pool = create_test_pool().await.expect("Failed to create pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        (pool.clone(), SqlxCategoryRepository::new(pool))
    }

    fn category(name: &str, slug: &str) -> Category {
        Category::new(name.to_string(), slug.to_string(), String::new(), None)
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let (_pool, repo) = setup().await;
        let created = repo.create(&category("Club", "club")).await.unwrap();
        assert!(created.id > 0);

        let by_slug = repo.get_by_slug("club").await.unwrap().unwrap();
        assert_eq!(by_slug.id, created.id);
        assert!(repo.exists_by_name("CLUB").await.unwrap());
        assert!(repo.exists_by_slug("club").await.unwrap());
        assert!(!repo.exists_by_slug("retro").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_sorted_and_filtered() {
        let (_pool, repo) = setup().await;
        for (name, slug) in [("Retro", "retro"), ("Club", "club"), ("National", "national")] {
            repo.create(&category(name, slug)).await.unwrap();
        }

        let all = repo.list_all().await.unwrap();
        let names: Vec<_> = all.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Club", "National", "Retro"]);

        let (found, total) = repo
            .list(&ListQuery::default().with_filter("q", "nat"))
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(found[0].slug, "national");
    }

    #[tokio::test]
    async fn test_update_and_count_products() {
        let (pool, repo) = setup().await;
        let mut created = repo.create(&category("Club", "club")).await.unwrap();

        created.description = "Domestic league kits".to_string();
        let updated = repo.update(&created).await.unwrap();
        assert_eq!(updated.description, "Domestic league kits");

        pool.execute(&format!(
            "INSERT INTO products (name, slug, price, category_id) VALUES ('Kit', 'kit', 100, {})",
            created.id
        ))
        .await
        .unwrap();
        assert_eq!(repo.count_products(created.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let (_pool, repo) = setup().await;
        let created = repo.create(&category("Club", "club")).await.unwrap();
        repo.delete(created.id).await.unwrap();
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
    }
}
