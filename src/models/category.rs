//! Category model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Product category (club, national team, retro, ...)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Category {
    /// Unique identifier
    pub id: i64,
    /// Category name (unique)
    pub name: String,
    /// URL-friendly slug (unique)
    pub slug: String,
    /// Category description
    pub description: String,
    /// Banner image URL
    pub image: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Category {
    /// Create a new Category. The ID is assigned by the database.
    pub fn new(name: String, slug: String, description: String, image: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name,
            slug,
            description,
            image,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Input for creating a new category
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCategoryInput {
    /// Category name
    pub name: String,
    /// Optional slug (auto-generated from name if not provided)
    #[serde(default)]
    pub slug: Option<String>,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
    /// Optional banner image
    #[serde(default)]
    pub image: Option<String>,
}

impl CreateCategoryInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slug: None,
            description: None,
            image: None,
        }
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Input for updating an existing category
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCategoryInput {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
}
