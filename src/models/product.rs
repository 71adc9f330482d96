//! Product model
//!
//! Jerseys with their size run, stock and gallery images. Prices are paisa.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sizes the store knows how to sell. Products offer a subset.
pub const KNOWN_SIZES: &[&str] = &[
    "XS", "S", "M", "L", "XL", "XXL", "3XL", "KIDS-S", "KIDS-M", "KIDS-L",
];

/// Normalize a size label (`" xl "` → `"XL"`)
pub fn normalize_size(size: &str) -> String {
    size.trim().to_uppercase()
}

/// Whether a size label (after normalization) is one the store sells
pub fn is_known_size(size: &str) -> bool {
    KNOWN_SIZES.contains(&normalize_size(size).as_str())
}

/// A product in the catalogue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    /// Unique identifier
    pub id: i64,
    /// Product name
    pub name: String,
    /// URL-friendly slug (unique)
    pub slug: String,
    /// Long description
    pub description: String,
    /// Category ID
    pub category_id: Option<i64>,
    /// Category name, when joined
    #[serde(default)]
    pub category_name: Option<String>,
    /// Club or national team
    pub team: Option<String>,
    /// Kit manufacturer
    pub brand: Option<String>,
    /// Selling price
    pub price: i64,
    /// Original price shown struck through
    pub compare_at_price: Option<i64>,
    /// Units in stock across all sizes
    pub stock: i64,
    /// Sizes offered
    pub sizes: Vec<String>,
    /// Shown on the storefront home page
    pub is_featured: bool,
    /// Visible on the storefront
    pub is_active: bool,
    /// Average review rating (0 when unrated)
    pub rating: f64,
    /// Number of reviews
    pub num_reviews: i64,
    /// Gallery images, ordered
    #[serde(default)]
    pub images: Vec<ProductImage>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Check if any units are left
    pub fn in_stock(&self) -> bool {
        self.stock > 0
    }

    /// Check if the product is sold in the given size
    pub fn offers_size(&self, size: &str) -> bool {
        let size = normalize_size(size);
        self.sizes.iter().any(|s| *s == size)
    }

    /// First gallery image, used as the thumbnail
    pub fn primary_image(&self) -> Option<&str> {
        self.images.first().map(|i| i.url.as_str())
    }

    /// Whole-percent discount against `compare_at_price`
    pub fn discount_percent(&self) -> Option<i64> {
        match self.compare_at_price {
            Some(compare) if compare > self.price && compare > 0 => {
                Some((compare - self.price) * 100 / compare)
            }
            _ => None,
        }
    }
}

/// Gallery image attached to a product
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct ProductImage {
    pub id: i64,
    pub product_id: i64,
    pub url: String,
    pub alt: Option<String>,
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a product
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProductInput {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    pub price: i64,
    #[serde(default)]
    pub compare_at_price: Option<i64>,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Image URLs to attach, in order
    #[serde(default)]
    pub images: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl CreateProductInput {
    pub fn new(name: impl Into<String>, price: i64, stock: i64) -> Self {
        Self {
            name: name.into(),
            slug: None,
            description: None,
            category_id: None,
            team: None,
            brand: None,
            price,
            compare_at_price: None,
            stock,
            sizes: vec!["S".to_string(), "M".to_string(), "L".to_string(), "XL".to_string()],
            is_featured: false,
            is_active: true,
            images: Vec::new(),
        }
    }

    pub fn with_category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_team(mut self, team: impl Into<String>) -> Self {
        self.team = Some(team.into());
        self
    }

    pub fn with_sizes(mut self, sizes: &[&str]) -> Self {
        self.sizes = sizes.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn featured(mut self) -> Self {
        self.is_featured = true;
        self
    }
}

/// Input for updating a product. `compare_at_price: 0` clears the compare price.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProductInput {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub team: Option<String>,
    pub brand: Option<String>,
    pub price: Option<i64>,
    pub compare_at_price: Option<i64>,
    pub stock: Option<i64>,
    pub sizes: Option<Vec<String>>,
    pub is_featured: Option<bool>,
    pub is_active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Product {
        let now = Utc::now();
        Product {
            id: 1,
            name: "Nepal Home 2024".to_string(),
            slug: "nepal-home-2024".to_string(),
            description: String::new(),
            category_id: None,
            category_name: None,
            team: Some("Nepal".to_string()),
            brand: None,
            price: 250_000,
            compare_at_price: Some(300_000),
            stock: 4,
            sizes: vec!["M".to_string(), "L".to_string()],
            is_featured: false,
            is_active: true,
            rating: 0.0,
            num_reviews: 0,
            images: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_offers_size_is_case_insensitive() {
        let product = sample();
        assert!(product.offers_size("m"));
        assert!(product.offers_size(" L "));
        assert!(!product.offers_size("XL"));
    }

    #[test]
    fn test_discount_percent() {
        let mut product = sample();
        assert_eq!(product.discount_percent(), Some(16));
        product.compare_at_price = Some(100);
        assert_eq!(product.discount_percent(), None);
    }

    #[test]
    fn test_known_sizes() {
        assert!(is_known_size("xxl"));
        assert!(!is_known_size("XXXXL"));
    }
}
