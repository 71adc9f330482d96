//! User repository
//!
//! Database operations for users.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL

use super::{bind_args, like_pattern, SqlArg, WhereBuilder};
use crate::db::{DynDatabasePool, InsertId};
use crate::models::{ListQuery, User};
use crate::with_backend;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

const USER_COLUMNS: &str =
    "id, name, email, password_hash, role, status, phone, address, city, avatar, created_at, updated_at";

/// Sortable fields exposed to list clients
const USER_SORTS: &[(&str, &str)] = &[
    ("id", "id"),
    ("name", "name"),
    ("email", "email"),
    ("role", "role"),
    ("status", "status"),
    ("created_at", "created_at"),
];

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by email (case-insensitive)
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Update a user
    async fn update(&self, user: &User) -> Result<User>;

    /// Delete a user
    async fn delete(&self, id: i64) -> Result<()>;

    /// Count total users
    async fn count(&self) -> Result<i64>;

    /// List users. Filters: `q` (name/email), `role`, `status`, `id` list.
    async fn list(&self, query: &ListQuery) -> Result<(Vec<User>, i64)>;
}

/// SQLx-based user repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    status: String,
    phone: Option<String>,
    address: Option<String>,
    city: Option<String>,
    avatar: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            role: row
                .role
                .parse()
                .with_context(|| format!("Invalid role in database: {}", row.role))?,
            status: row.status.parse().unwrap_or_default(),
            phone: row.phone,
            address: row.address,
            city: row.city,
            avatar: row.avatar,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn list_filters(query: &ListQuery) -> WhereBuilder {
    let mut filters = WhereBuilder::new();

    let ids = query.filter_ids();
    if !ids.is_empty() {
        filters.push_in("id", &ids);
    }
    if let Some(q) = query.filter_str("q") {
        let pattern = like_pattern(&q);
        filters.push(
            "(name LIKE ? ESCAPE '!' OR email LIKE ? ESCAPE '!')",
            [SqlArg::Text(pattern.clone()), SqlArg::Text(pattern)],
        );
    }
    if let Some(role) = query.filter_str("role") {
        filters.push("role = ?", [SqlArg::Text(role.to_lowercase())]);
    }
    if let Some(status) = query.filter_str("status") {
        filters.push("status = ?", [SqlArg::Text(status.to_lowercase())]);
    }

    filters
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        let now = Utc::now();
        let email = user.email.trim().to_lowercase();

        let id = with_backend!(self.pool, db => {
            sqlx::query(
                r#"
                INSERT INTO users (name, email, password_hash, role, status, phone, address, city, avatar, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&user.name)
            .bind(&email)
            .bind(&user.password_hash)
            .bind(user.role.to_string())
            .bind(user.status.to_string())
            .bind(&user.phone)
            .bind(&user.address)
            .bind(&user.city)
            .bind(&user.avatar)
            .bind(now)
            .bind(now)
            .execute(db)
            .await
            .map(|r| r.insert_id())
        })
        .context("Failed to create user")?;

        Ok(User {
            id,
            email,
            created_at: now,
            updated_at: now,
            ..user.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let row = with_backend!(self.pool, db => {
            sqlx::query_as::<_, UserRow>(&sql).bind(id).fetch_optional(db).await
        })
        .context("Failed to get user by ID")?;

        row.map(User::try_from).transpose()
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS);
        let email = email.trim().to_lowercase();
        let row = with_backend!(self.pool, db => {
            sqlx::query_as::<_, UserRow>(&sql).bind(&email).fetch_optional(db).await
        })
        .context("Failed to get user by email")?;

        row.map(User::try_from).transpose()
    }

    async fn update(&self, user: &User) -> Result<User> {
        let now = Utc::now();
        let email = user.email.trim().to_lowercase();

        with_backend!(self.pool, db => {
            sqlx::query(
                r#"
                UPDATE users
                SET name = ?, email = ?, password_hash = ?, role = ?, status = ?,
                    phone = ?, address = ?, city = ?, avatar = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&user.name)
            .bind(&email)
            .bind(&user.password_hash)
            .bind(user.role.to_string())
            .bind(user.status.to_string())
            .bind(&user.phone)
            .bind(&user.address)
            .bind(&user.city)
            .bind(&user.avatar)
            .bind(now)
            .bind(user.id)
            .execute(db)
            .await
            .map(|_| ())
        })
        .context("Failed to update user")?;

        self.get_by_id(user.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        with_backend!(self.pool, db => {
            sqlx::query("DELETE FROM users WHERE id = ?").bind(id).execute(db).await.map(|_| ())
        })
        .context("Failed to delete user")?;
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let count = with_backend!(self.pool, db => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users").fetch_one(db).await
        })
        .context("Failed to count users")?;
        Ok(count)
    }

    async fn list(&self, query: &ListQuery) -> Result<(Vec<User>, i64)> {
        let filters = list_filters(query);
        let order_by = query.order_by(USER_SORTS, "created_at DESC");

        let sql = format!(
            "SELECT {} FROM users{} ORDER BY {}, id DESC LIMIT ? OFFSET ?",
            USER_COLUMNS,
            filters.sql(),
            order_by
        );
        let count_sql = format!("SELECT COUNT(*) FROM users{}", filters.sql());

        let (rows, total) = with_backend!(self.pool, db => {
            let rows = bind_args!(sqlx::query_as::<_, UserRow>(&sql), filters.args())
                .bind(query.limit)
                .bind(query.offset)
                .fetch_all(db)
                .await;
            let total = bind_args!(sqlx::query_scalar::<_, i64>(&count_sql), filters.args())
                .fetch_one(db)
                .await;
            (rows, total)
        });

        let users = rows
            .context("Failed to list users")?
            .into_iter()
            .map(User::try_from)
            .collect::<Result<Vec<_>>>()?;
        let total = total.context("Failed to count users")?;

        Ok((users, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations::run_migrations};
    use crate::models::{UserRole, UserStatus};

    async fn setup() -> SqlxUserRepository {
        let pool = create_test_pool().await.expect("Failed to create pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        SqlxUserRepository::new(pool)
    }

    fn user(name: &str, email: &str, role: UserRole) -> User {
        User::new(name.to_string(), email.to_string(), "hash".to_string(), role)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = setup().await;

        let created = repo
            .create(&user("Sita", "Sita@Example.com", UserRole::Customer))
            .await
            .unwrap();
        assert!(created.id > 0);
        assert_eq!(created.email, "sita@example.com");

        let by_id = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.name, "Sita");
        assert_eq!(by_id.role, UserRole::Customer);

        let by_email = repo.get_by_email("SITA@example.com").await.unwrap();
        assert_eq!(by_email.map(|u| u.id), Some(created.id));
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let repo = setup().await;
        repo.create(&user("A", "a@example.com", UserRole::Customer))
            .await
            .unwrap();
        assert!(repo
            .create(&user("B", "a@example.com", UserRole::Customer))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_update_user() {
        let repo = setup().await;
        let mut created = repo
            .create(&user("Hari", "hari@example.com", UserRole::Customer))
            .await
            .unwrap();

        created.city = Some("Pokhara".to_string());
        created.status = UserStatus::Banned;
        let updated = repo.update(&created).await.unwrap();

        assert_eq!(updated.city.as_deref(), Some("Pokhara"));
        assert!(updated.is_banned());
    }

    #[tokio::test]
    async fn test_list_with_filters() {
        let repo = setup().await;
        repo.create(&user("Admin", "admin@example.com", UserRole::Admin))
            .await
            .unwrap();
        repo.create(&user("Sita", "sita@example.com", UserRole::Customer))
            .await
            .unwrap();
        repo.create(&user("Gita", "gita@example.com", UserRole::Customer))
            .await
            .unwrap();

        let (all, total) = repo.list(&ListQuery::default()).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(all.len(), 3);

        let customers = ListQuery::default().with_filter("role", "customer");
        let (_, total) = repo.list(&customers).await.unwrap();
        assert_eq!(total, 2);

        let search = ListQuery::default().with_filter("q", "gita");
        let (found, total) = repo.list(&search).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(found[0].name, "Gita");
    }

    #[tokio::test]
    async fn test_delete_and_count() {
        let repo = setup().await;
        let created = repo
            .create(&user("Temp", "temp@example.com", UserRole::Customer))
            .await
            .unwrap();
        assert_eq!(repo.count().await.unwrap(), 1);

        repo.delete(created.id).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 0);
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
    }
}
