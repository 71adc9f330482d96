//! Database layer
//!
//! This module provides database abstraction for the JerseyNexus backend.
//! It supports:
//! - SQLite (default, for single-binary deployment)
//! - MySQL (for larger deployments)
//!
//! The database driver is selected based on configuration.
//!
//! # Architecture
//!
//! The `DatabasePool` trait hides which backend is in use. Repositories borrow
//! the concrete sqlx pool through [`DatabasePool::backend`] and run the same
//! query text against either driver with the [`with_backend!`](crate::with_backend)
//! macro. Rows are decoded through `sqlx::FromRow` structs, which are generic
//! over the row type.
//!
//! # Usage
//!
//! ```ignore
//! use jerseynexus::config::DatabaseConfig;
//! use jerseynexus::db::{create_pool, migrations};
//!
//! let config = DatabaseConfig::default();
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, Backend, DatabasePool, DynDatabasePool, InsertId,
    MysqlDatabase, SqliteDatabase,
};
