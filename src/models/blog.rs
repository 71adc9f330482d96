//! Blog model
//!
//! Editorial posts (match reports, kit launches, size guides) shown on the
//! storefront and managed from the back office.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A blog post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct Blog {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub excerpt: String,
    pub content: String,
    pub cover_image: Option<String>,
    pub author_id: Option<i64>,
    pub is_published: bool,
    /// Set the first time the post is published
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a blog post
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBlogInput {
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub excerpt: Option<String>,
    pub content: String,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub is_published: bool,
}

/// Input for updating a blog post
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateBlogInput {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub cover_image: Option<String>,
    pub is_published: Option<bool>,
}

/// Excerpt derived from content when none is given: first paragraph, at most
/// `max_chars` characters, cut on a word boundary.
pub fn derive_excerpt(content: &str, max_chars: usize) -> String {
    let first = content
        .split("\n\n")
        .map(str::trim)
        .find(|p| !p.is_empty())
        .unwrap_or("");

    if first.chars().count() <= max_chars {
        return first.to_string();
    }

    let cut: String = first.chars().take(max_chars).collect();
    match cut.rfind(' ') {
        Some(idx) if idx > 0 => format!("{}…", &cut[..idx]),
        _ => format!("{}…", cut),
    }
}
