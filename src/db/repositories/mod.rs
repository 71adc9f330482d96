//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles CRUD operations for a specific entity and works
//! against both SQLite and MySQL through [`with_backend!`](crate::with_backend).

pub mod blog;
pub mod cart;
pub mod category;
pub mod order;
pub mod product;
pub mod review;
pub mod session;
pub mod user;

pub use blog::{BlogRepository, SqlxBlogRepository};
pub use cart::{CartRepository, SqlxCartRepository};
pub use category::{CategoryRepository, SqlxCategoryRepository};
pub use order::{OrderRepository, SqlxOrderRepository, StockError};
pub use product::{ProductRepository, SqlxProductRepository};
pub use review::{ReviewRepository, SqlxReviewRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};

/// Positional bind value for dynamically built WHERE clauses
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SqlArg {
    Int(i64),
    Text(String),
    Bool(bool),
}

/// Accumulates `AND`-joined conditions and their bind values
#[derive(Debug, Default)]
pub(crate) struct WhereBuilder {
    clauses: Vec<String>,
    args: Vec<SqlArg>,
}

impl WhereBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a condition with its `?` values, in placeholder order
    pub(crate) fn push(&mut self, clause: impl Into<String>, args: impl IntoIterator<Item = SqlArg>) {
        self.clauses.push(clause.into());
        self.args.extend(args);
    }

    /// `column IN (?, ?, ...)`; an empty list matches nothing
    pub(crate) fn push_in(&mut self, column: &str, ids: &[i64]) {
        if ids.is_empty() {
            self.clauses.push("1 = 0".to_string());
            return;
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        self.clauses.push(format!("{} IN ({})", column, placeholders));
        self.args.extend(ids.iter().map(|id| SqlArg::Int(*id)));
    }

    /// ` WHERE a AND b`, or an empty string
    pub(crate) fn sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub(crate) fn args(&self) -> &[SqlArg] {
        &self.args
    }
}

/// `%term%` for `LIKE ? ESCAPE '!'`, with wildcards in the term escaped.
/// `!` is used because backslash escaping differs between SQLite and MySQL.
pub(crate) fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('!', "!!")
        .replace('%', "!%")
        .replace('_', "!_");
    format!("%{}%", escaped)
}

/// Bind a slice of [`SqlArg`] onto a sqlx query, in order
macro_rules! bind_args {
    ($query:expr, $args:expr) => {{
        let mut query = $query;
        for arg in $args {
            query = match arg {
                $crate::db::repositories::SqlArg::Int(v) => query.bind(*v),
                $crate::db::repositories::SqlArg::Text(v) => query.bind(v.clone()),
                $crate::db::repositories::SqlArg::Bool(v) => query.bind(*v),
            };
        }
        query
    }};
}

pub(crate) use bind_args;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_where_builder() {
        let mut builder = WhereBuilder::new();
        assert_eq!(builder.sql(), "");

        builder.push("price >= ?", [SqlArg::Int(100)]);
        builder.push_in("id", &[1, 2]);
        assert_eq!(builder.sql(), " WHERE price >= ? AND id IN (?, ?)");
        assert_eq!(builder.args().len(), 3);
    }

    #[test]
    fn test_push_in_empty_matches_nothing() {
        let mut builder = WhereBuilder::new();
        builder.push_in("id", &[]);
        assert_eq!(builder.sql(), " WHERE 1 = 0");
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("home"), "%home%");
        assert_eq!(like_pattern("50%_off!"), "%50!%!_off!!%");
    }
}
