//! Product service
//!
//! Catalogue rules on top of the product repository:
//! - price, stock and size validation
//! - slug generation and uniqueness
//! - gallery images
//! - read-through caching of single products

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::{CategoryRepository, ProductRepository};
use crate::models::{
    is_known_size, normalize_size, CreateProductInput, ListQuery, PagedResult, Product,
    ProductImage, UpdateProductInput,
};
use crate::services::category::generate_slug;
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Default cache TTL for single products (10 minutes)
const PRODUCT_CACHE_TTL_SECS: u64 = 600;

const CACHE_KEY_PRODUCT_BY_ID: &str = "product:id:";
const CACHE_KEY_PRODUCT_BY_SLUG: &str = "product:slug:";

/// Error types for product service operations
#[derive(Debug, thiserror::Error)]
pub enum ProductServiceError {
    #[error("Product not found: {0}")]
    NotFound(String),

    #[error("Product slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Category not found: {0}")]
    CategoryNotFound(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Product service
pub struct ProductService {
    repo: Arc<dyn ProductRepository>,
    category_repo: Arc<dyn CategoryRepository>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

impl ProductService {
    pub fn new(
        repo: Arc<dyn ProductRepository>,
        category_repo: Arc<dyn CategoryRepository>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            repo,
            category_repo,
            cache,
            cache_ttl: Duration::from_secs(PRODUCT_CACHE_TTL_SECS),
        }
    }

    /// Create a product and attach any image URLs from the input
    pub async fn create(&self, input: CreateProductInput) -> Result<Product, ProductServiceError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(ProductServiceError::ValidationError(
                "Product name cannot be empty".to_string(),
            ));
        }
        validate_pricing(input.price, input.compare_at_price, input.stock)?;
        let sizes = validate_sizes(&input.sizes)?;
        if let Some(category_id) = input.category_id {
            self.ensure_category(category_id).await?;
        }

        let slug = generate_slug(input.slug.as_deref().unwrap_or(&name));
        if slug.is_empty() {
            return Err(ProductServiceError::ValidationError(
                "Product slug cannot be empty".to_string(),
            ));
        }
        if self
            .repo
            .exists_by_slug(&slug, None)
            .await
            .context("Failed to check slug uniqueness")?
        {
            return Err(ProductServiceError::DuplicateSlug(slug));
        }

        let now = Utc::now();
        let product = Product {
            id: 0,
            name,
            slug,
            description: input.description.unwrap_or_default(),
            category_id: input.category_id,
            category_name: None,
            team: non_blank(input.team),
            brand: non_blank(input.brand),
            price: input.price,
            compare_at_price: input.compare_at_price,
            stock: input.stock,
            sizes,
            is_featured: input.is_featured,
            is_active: input.is_active,
            rating: 0.0,
            num_reviews: 0,
            images: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        let created = self
            .repo
            .create(&product)
            .await
            .context("Failed to create product")?;

        for url in input.images.iter().filter(|u| !u.trim().is_empty()) {
            self.repo
                .add_image(created.id, url.trim(), None)
                .await
                .context("Failed to attach product image")?;
        }

        info!(product_id = created.id, slug = %created.slug, "product created");
        self.get_fresh(created.id).await
    }

    /// Get product by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Product, ProductServiceError> {
        let cache_key = format!("{}{}", CACHE_KEY_PRODUCT_BY_ID, id);
        if let Some(product) = self.cache.get::<Product>(&cache_key).await.ok().flatten() {
            return Ok(product);
        }

        let product = self.get_fresh(id).await?;
        let _ = self.cache.set(&cache_key, &product, self.cache_ttl).await;
        Ok(product)
    }

    /// Get product by slug
    pub async fn get_by_slug(&self, slug: &str) -> Result<Product, ProductServiceError> {
        let cache_key = format!("{}{}", CACHE_KEY_PRODUCT_BY_SLUG, slug);
        if let Some(product) = self.cache.get::<Product>(&cache_key).await.ok().flatten() {
            return Ok(product);
        }

        let product = self
            .repo
            .get_by_slug(slug)
            .await
            .context("Failed to get product by slug")?
            .ok_or_else(|| ProductServiceError::NotFound(slug.to_string()))?;
        let _ = self.cache.set(&cache_key, &product, self.cache_ttl).await;
        Ok(product)
    }

    /// Filtered, sorted, paged product list.
    ///
    /// Storefront callers pass `public = true`, which forces `active=true`.
    pub async fn list(
        &self,
        query: &ListQuery,
        public: bool,
    ) -> Result<PagedResult<Product>, ProductServiceError> {
        let query = if public {
            query.clone().with_filter("active", true)
        } else {
            query.clone()
        };
        let (items, total) = self.repo.list(&query).await.context("Failed to list products")?;
        Ok(PagedResult::new(items, total, &query))
    }

    /// Update a product
    pub async fn update(
        &self,
        id: i64,
        input: UpdateProductInput,
    ) -> Result<Product, ProductServiceError> {
        let mut product = self.get_fresh(id).await?;

        if let Some(name) = input.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ProductServiceError::ValidationError(
                    "Product name cannot be empty".to_string(),
                ));
            }
            product.name = name;
        }
        if let Some(slug) = input.slug {
            let slug = generate_slug(&slug);
            if slug.is_empty() {
                return Err(ProductServiceError::ValidationError(
                    "Product slug cannot be empty".to_string(),
                ));
            }
            if self
                .repo
                .exists_by_slug(&slug, Some(id))
                .await
                .context("Failed to check slug uniqueness")?
            {
                return Err(ProductServiceError::DuplicateSlug(slug));
            }
            product.slug = slug;
        }
        if let Some(description) = input.description {
            product.description = description;
        }
        if let Some(category_id) = input.category_id {
            // 0 detaches the product from its category
            if category_id == 0 {
                product.category_id = None;
            } else {
                self.ensure_category(category_id).await?;
                product.category_id = Some(category_id);
            }
        }
        if input.team.is_some() {
            product.team = non_blank(input.team);
        }
        if input.brand.is_some() {
            product.brand = non_blank(input.brand);
        }
        if let Some(price) = input.price {
            product.price = price;
        }
        if let Some(compare) = input.compare_at_price {
            product.compare_at_price = if compare == 0 { None } else { Some(compare) };
        }
        if let Some(stock) = input.stock {
            product.stock = stock;
        }
        if let Some(sizes) = input.sizes {
            product.sizes = validate_sizes(&sizes)?;
        }
        if let Some(featured) = input.is_featured {
            product.is_featured = featured;
        }
        if let Some(active) = input.is_active {
            product.is_active = active;
        }

        validate_pricing(product.price, product.compare_at_price, product.stock)?;

        self.repo
            .update(&product)
            .await
            .context("Failed to update product")?;
        self.invalidate_cache().await;
        self.get_fresh(id).await
    }

    /// Delete a product. Order items keep their snapshot.
    pub async fn delete(&self, id: i64) -> Result<(), ProductServiceError> {
        self.get_fresh(id).await?;
        self.repo.delete(id).await.context("Failed to delete product")?;
        self.invalidate_cache().await;
        info!(product_id = id, "product deleted");
        Ok(())
    }

    /// Append an image to the gallery
    pub async fn add_image(
        &self,
        product_id: i64,
        url: &str,
        alt: Option<&str>,
    ) -> Result<ProductImage, ProductServiceError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ProductServiceError::ValidationError(
                "Image URL cannot be empty".to_string(),
            ));
        }
        self.get_fresh(product_id).await?;

        let image = self
            .repo
            .add_image(product_id, url, alt.filter(|a| !a.trim().is_empty()))
            .await
            .context("Failed to add product image")?;
        self.invalidate_cache().await;
        Ok(image)
    }

    /// Remove an image from the gallery
    pub async fn delete_image(&self, product_id: i64, image_id: i64) -> Result<(), ProductServiceError> {
        let removed = self
            .repo
            .delete_image(product_id, image_id)
            .await
            .context("Failed to delete product image")?;
        if !removed {
            return Err(ProductServiceError::NotFound(format!(
                "image {} of product {}",
                image_id, product_id
            )));
        }
        self.invalidate_cache().await;
        Ok(())
    }

    /// Store a recomputed review aggregate
    pub async fn set_rating(
        &self,
        product_id: i64,
        rating: f64,
        num_reviews: i64,
    ) -> Result<(), ProductServiceError> {
        self.repo
            .set_rating(product_id, rating, num_reviews)
            .await
            .context("Failed to store product rating")?;
        self.invalidate_cache().await;
        Ok(())
    }

    /// Products at or below the stock threshold
    pub async fn low_stock(&self, threshold: i64, limit: i64) -> Result<Vec<Product>, ProductServiceError> {
        Ok(self
            .repo
            .list_low_stock(threshold, limit)
            .await
            .context("Failed to list low stock products")?)
    }

    /// Total number of products
    pub async fn count(&self) -> Result<i64, ProductServiceError> {
        Ok(self.repo.count().await?)
    }

    /// Drop cached products. Called after anything that changes stock.
    pub async fn invalidate_cache(&self) {
        let _ = self
            .cache
            .delete_pattern(&format!("{}*", CACHE_KEY_PRODUCT_BY_ID))
            .await;
        let _ = self
            .cache
            .delete_pattern(&format!("{}*", CACHE_KEY_PRODUCT_BY_SLUG))
            .await;
    }

    async fn get_fresh(&self, id: i64) -> Result<Product, ProductServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get product by ID")?
            .ok_or_else(|| ProductServiceError::NotFound(id.to_string()))
    }

    async fn ensure_category(&self, category_id: i64) -> Result<(), ProductServiceError> {
        match self
            .category_repo
            .get_by_id(category_id)
            .await
            .context("Failed to get category")?
        {
            Some(_) => Ok(()),
            None => Err(ProductServiceError::CategoryNotFound(category_id)),
        }
    }
}

fn validate_pricing(price: i64, compare_at_price: Option<i64>, stock: i64) -> Result<(), ProductServiceError> {
    if price <= 0 {
        return Err(ProductServiceError::ValidationError(
            "Price must be greater than zero".to_string(),
        ));
    }
    if stock < 0 {
        return Err(ProductServiceError::ValidationError(
            "Stock cannot be negative".to_string(),
        ));
    }
    if let Some(compare) = compare_at_price {
        if compare <= price {
            return Err(ProductServiceError::ValidationError(
                "Compare-at price must be greater than price".to_string(),
            ));
        }
    }
    Ok(())
}

/// Normalize, dedupe and check sizes against the known size list
fn validate_sizes(sizes: &[String]) -> Result<Vec<String>, ProductServiceError> {
    let mut out: Vec<String> = Vec::with_capacity(sizes.len());
    for size in sizes {
        if !is_known_size(size) {
            return Err(ProductServiceError::ValidationError(format!(
                "Unknown size: {}",
                size.trim()
            )));
        }
        let size = normalize_size(size);
        if !out.contains(&size) {
            out.push(size);
        }
    }
    if out.is_empty() {
        return Err(ProductServiceError::ValidationError(
            "At least one size is required".to_string(),
        ));
    }
    Ok(out)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
