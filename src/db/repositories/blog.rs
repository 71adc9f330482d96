//! Blog repository
//!
//! Database operations for blog posts.

use super::{bind_args, like_pattern, SqlArg, WhereBuilder};
use crate::db::{DynDatabasePool, InsertId};
use crate::models::{Blog, ListQuery};
use crate::with_backend;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

const BLOG_COLUMNS: &str = "id, title, slug, excerpt, content, cover_image, author_id, is_published, published_at, created_at, updated_at";

const BLOG_SORTS: &[(&str, &str)] = &[
    ("id", "id"),
    ("title", "title"),
    ("published_at", "published_at"),
    ("created_at", "created_at"),
];

/// Blog repository trait
#[async_trait]
pub trait BlogRepository: Send + Sync {
    /// Create a new post
    async fn create(&self, blog: &Blog) -> Result<Blog>;

    /// Get post by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Blog>>;

    /// Get post by slug
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Blog>>;

    /// List posts. Filters: `published`, `q` (title), `id` list.
    async fn list(&self, query: &ListQuery) -> Result<(Vec<Blog>, i64)>;

    /// Update a post
    async fn update(&self, blog: &Blog) -> Result<Blog>;

    /// Delete a post
    async fn delete(&self, id: i64) -> Result<()>;

    /// Check if a slug is taken, optionally ignoring one post
    async fn exists_by_slug(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;
}

/// SQLx-based blog repository implementation
pub struct SqlxBlogRepository {
    pool: DynDatabasePool,
}

impl SqlxBlogRepository {
    /// Create a new SQLx blog repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn BlogRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl BlogRepository for SqlxBlogRepository {
    async fn create(&self, blog: &Blog) -> Result<Blog> {
        let now = Utc::now();
        let id = with_backend!(self.pool, db => {
            sqlx::query(
                r#"
                INSERT INTO blogs (title, slug, excerpt, content, cover_image, author_id,
                    is_published, published_at, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&blog.title)
            .bind(&blog.slug)
            .bind(&blog.excerpt)
            .bind(&blog.content)
            .bind(&blog.cover_image)
            .bind(blog.author_id)
            .bind(blog.is_published)
            .bind(blog.published_at)
            .bind(now)
            .bind(now)
            .execute(db)
            .await
            .map(|r| r.insert_id())
        })
        .context("Failed to create blog post")?;

        Ok(Blog {
            id,
            created_at: now,
            updated_at: now,
            ..blog.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Blog>> {
        let sql = format!("SELECT {} FROM blogs WHERE id = ?", BLOG_COLUMNS);
        let blog = with_backend!(self.pool, db => {
            sqlx::query_as::<_, Blog>(&sql).bind(id).fetch_optional(db).await
        })
        .context("Failed to get blog post")?;
        Ok(blog)
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Blog>> {
        let sql = format!("SELECT {} FROM blogs WHERE slug = ?", BLOG_COLUMNS);
        let blog = with_backend!(self.pool, db => {
            sqlx::query_as::<_, Blog>(&sql).bind(slug).fetch_optional(db).await
        })
        .context("Failed to get blog post by slug")?;
        Ok(blog)
    }

    async fn list(&self, query: &ListQuery) -> Result<(Vec<Blog>, i64)> {
        let mut filters = WhereBuilder::new();
        let ids = query.filter_ids();
        if !ids.is_empty() {
            filters.push_in("id", &ids);
        }
        if let Some(published) = query.filter_bool("published") {
            filters.push("is_published = ?", [SqlArg::Bool(published)]);
        }
        if let Some(q) = query.filter_str("q") {
            filters.push("title LIKE ? ESCAPE '!'", [SqlArg::Text(like_pattern(&q))]);
        }

        let order_by = query.order_by(BLOG_SORTS, "created_at DESC");
        let sql = format!(
            "SELECT {} FROM blogs{} ORDER BY {}, id DESC LIMIT ? OFFSET ?",
            BLOG_COLUMNS,
            filters.sql(),
            order_by
        );
        let count_sql = format!("SELECT COUNT(*) FROM blogs{}", filters.sql());

        let (rows, total) = with_backend!(self.pool, db => {
            let rows = bind_args!(sqlx::query_as::<_, Blog>(&sql), filters.args())
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
            rows.context("Failed to list blog posts")?,
            total.context("Failed to count blog posts")?,
        ))
    }

    async fn update(&self, blog: &Blog) -> Result<Blog> {
        let now = Utc::now();
        with_backend!(self.pool, db => {
            sqlx::query(
                r#"
                UPDATE blogs
                SET title = ?, slug = ?, excerpt = ?, content = ?, cover_image = ?,
                    is_published = ?, published_at = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&blog.title)
            .bind(&blog.slug)
            .bind(&blog.excerpt)
            .bind(&blog.content)
            .bind(&blog.cover_image)
            .bind(blog.is_published)
            .bind(blog.published_at)
            .bind(now)
            .bind(blog.id)
            .execute(db)
            .await
            .map(|_| ())
        })
        .context("Failed to update blog post")?;

        Ok(Blog {
            updated_at: now,
            ..blog.clone()
        })
    }

    async fn delete(&self, id: i64) -> Result<()> {
        with_backend!(self.pool, db => {
            sqlx::query("DELETE FROM blogs WHERE id = ?").bind(id).execute(db).await.map(|_| ())
        })
        .context("Failed to delete blog post")?;
        Ok(())
    }

    async fn exists_by_slug(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let count = with_backend!(self.pool, db => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM blogs WHERE slug = ? AND id <> ?")
                .bind(slug)
                .bind(exclude_id.unwrap_or(0))
                .fetch_one(db)
                .await
        })
        .context("Failed to check blog slug")?;
        Ok(count > 0)
    }
}
