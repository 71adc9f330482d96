//! Session repository
//!
//! Database operations for login sessions.
//!
//! This module provides:
//! - `SessionRepository` trait defining the interface for session data access
//! - `SqlxSessionRepository` implementing the trait for SQLite and MySQL

use crate::db::DynDatabasePool;
use crate::models::Session;
use crate::with_backend;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Create a new session
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Get session by ID (token)
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    /// Delete a session
    async fn delete(&self, id: &str) -> Result<()>;

    /// Delete all sessions for a user, optionally sparing one
    async fn delete_by_user(&self, user_id: i64, keep: Option<&str>) -> Result<u64>;

    /// Delete expired sessions
    async fn delete_expired(&self) -> Result<u64>;
}

/// SQLx-based session repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    /// Create a new SQLx session repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        with_backend!(self.pool, db => {
            sqlx::query("INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)")
                .bind(&session.id)
                .bind(session.user_id)
                .bind(session.expires_at)
                .bind(session.created_at)
                .execute(db)
                .await
                .map(|_| ())
        })
        .context("Failed to create session")?;

        Ok(session.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        let session = with_backend!(self.pool, db => {
            sqlx::query_as::<_, Session>(
                "SELECT id, user_id, expires_at, created_at FROM sessions WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(db)
            .await
        })
        .context("Failed to get session")?;

        Ok(session)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        with_backend!(self.pool, db => {
            sqlx::query("DELETE FROM sessions WHERE id = ?").bind(id).execute(db).await.map(|_| ())
        })
        .context("Failed to delete session")?;
        Ok(())
    }

    async fn delete_by_user(&self, user_id: i64, keep: Option<&str>) -> Result<u64> {
        let keep = keep.unwrap_or("");
        let result = with_backend!(self.pool, db => {
            sqlx::query("DELETE FROM sessions WHERE user_id = ? AND id <> ?")
                .bind(user_id)
                .bind(keep)
                .execute(db)
                .await
                .map(|r| r.rows_affected())
        })
        .context("Failed to delete user sessions")?;
        Ok(result)
    }

    async fn delete_expired(&self) -> Result<u64> {
        let deleted = with_backend!(self.pool, db => {
            sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
                .bind(Utc::now())
                .execute(db)
                .await
                .map(|r| r.rows_affected())
        })
        .context("Failed to delete expired sessions")?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations::run_migrations, DatabasePool};
    use chrono::Duration;

    async fn setup_test_repo() -> (DynDatabasePool, SqlxSessionRepository) {
        let pool = create_test_pool().await.expect("Failed to create pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        let repo = SqlxSessionRepository::new(pool.clone());
        (pool, repo)
    }

    async fn create_test_user(pool: &DynDatabasePool, n: i64) {
        pool.execute(&format!(
            "INSERT INTO users (id, name, email, password_hash) VALUES ({n}, 'User {n}', 'user{n}@example.com', 'hash')"
        ))
        .await
        .expect("Failed to create user");
    }

    #[tokio::test]
    async fn test_create_and_get_session() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, 1).await;

        let session = Session::issue(1, 7);
        repo.create(&session).await.expect("Failed to create session");

        let found = repo
            .get_by_id(&session.id)
            .await
            .expect("Failed to get session")
            .expect("Session not found");

        assert_eq!(found.user_id, 1);
        assert!(!found.is_expired());
    }

    #[tokio::test]
    async fn test_get_session_not_found() {
        let (_pool, repo) = setup_test_repo().await;
        assert!(repo.get_by_id("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_by_user_keeps_current() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, 1).await;
        create_test_user(&pool, 2).await;

        let current = Session::issue(1, 7);
        let other = Session::issue(1, 7);
        let foreign = Session::issue(2, 7);
        for s in [&current, &other, &foreign] {
            repo.create(s).await.unwrap();
        }

        let deleted = repo.delete_by_user(1, Some(&current.id)).await.unwrap();
        assert_eq!(deleted, 1);

        assert!(repo.get_by_id(&current.id).await.unwrap().is_some());
        assert!(repo.get_by_id(&other.id).await.unwrap().is_none());
        assert!(repo.get_by_id(&foreign.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_expired_sessions() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, 1).await;

        let now = Utc::now();
        let expired = Session {
            id: "expired".to_string(),
            user_id: 1,
            expires_at: now - Duration::days(1),
            created_at: now - Duration::days(8),
        };
        let valid = Session::issue(1, 7);

        repo.create(&expired).await.unwrap();
        repo.create(&valid).await.unwrap();

        assert_eq!(repo.delete_expired().await.unwrap(), 1);
        assert!(repo.get_by_id("expired").await.unwrap().is_none());
        assert!(repo.get_by_id(&valid.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sessions_cascade_with_user() {
        let (pool, repo) = setup_test_repo().await;
        create_test_user(&pool, 1).await;

        let session = Session::issue(1, 7);
        repo.create(&session).await.unwrap();

        pool.execute("DELETE FROM users WHERE id = 1").await.unwrap();
        assert!(repo.get_by_id(&session.id).await.unwrap().is_none());
    }
}
