//! Category service
//!
//! Business logic for catalogue categories:
//! - Create, read, update, delete
//! - Name and slug uniqueness
//! - Slug generation from name
//! - Refusing to delete a category that still holds products
//!
//! Reads go through the shared cache; every write clears the category keys.

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::CategoryRepository;
use crate::models::{Category, CreateCategoryInput, ListQuery, PagedResult, UpdateCategoryInput};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Default cache TTL for categories (1 hour)
const CATEGORY_CACHE_TTL_SECS: u64 = 3600;

/// Cache key prefixes
const CACHE_KEY_CATEGORY_BY_ID: &str = "category:id:";
const CACHE_KEY_CATEGORY_BY_SLUG: &str = "category:slug:";
const CACHE_KEY_CATEGORY_ALL: &str = "category:all";

/// Error types for category service operations
#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    /// Category name already exists
    #[error("Category name already exists: {0}")]
    DuplicateName(String),

    /// Category slug already exists
    #[error("Category slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Category not found: {0}")]
    NotFound(String),

    /// Products still point at the category
    #[error("Category has {0} product(s)")]
    HasProducts(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Category service
pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>, cache: Arc<Cache>) -> Self {
        Self::with_cache_ttl(repo, cache, Duration::from_secs(CATEGORY_CACHE_TTL_SECS))
    }

    pub fn with_cache_ttl(
        repo: Arc<dyn CategoryRepository>,
        cache: Arc<Cache>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            repo,
            cache,
            cache_ttl,
        }
    }

    /// Create a new category
    ///
    /// # Errors
    /// - `ValidationError` for a blank name or slug
    /// - `DuplicateName` / `DuplicateSlug` when either is taken
    pub async fn create(&self, input: CreateCategoryInput) -> Result<Category, CategoryServiceError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(CategoryServiceError::ValidationError(
                "Category name cannot be empty".to_string(),
            ));
        }

        if self
            .repo
            .exists_by_name(&name)
            .await
            .context("Failed to check name uniqueness")?
        {
            return Err(CategoryServiceError::DuplicateName(name));
        }

        let slug = match input.slug {
            Some(slug) => generate_slug(&slug),
            None => generate_slug(&name),
        };
        if slug.is_empty() {
            return Err(CategoryServiceError::ValidationError(
                "Category slug cannot be empty".to_string(),
            ));
        }
        if self
            .repo
            .exists_by_slug(&slug)
            .await
            .context("Failed to check slug uniqueness")?
        {
            return Err(CategoryServiceError::DuplicateSlug(slug));
        }

        let category = Category::new(
            name,
            slug,
            input.description.unwrap_or_default(),
            input.image.filter(|i| !i.trim().is_empty()),
        );
        let created = self
            .repo
            .create(&category)
            .await
            .context("Failed to create category")?;

        self.invalidate_cache().await;
        info!(category_id = created.id, slug = %created.slug, "category created");
        Ok(created)
    }

    /// Get category by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Category, CategoryServiceError> {
        let cache_key = format!("{}{}", CACHE_KEY_CATEGORY_BY_ID, id);
        if let Some(category) = self.cache.get::<Category>(&cache_key).await.ok().flatten() {
            return Ok(category);
        }

        let category = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get category by ID")?
            .ok_or_else(|| CategoryServiceError::NotFound(id.to_string()))?;

        let _ = self.cache.set(&cache_key, &category, self.cache_ttl).await;
        Ok(category)
    }

    /// Get category by slug
    pub async fn get_by_slug(&self, slug: &str) -> Result<Category, CategoryServiceError> {
        let cache_key = format!("{}{}", CACHE_KEY_CATEGORY_BY_SLUG, slug);
        if let Some(category) = self.cache.get::<Category>(&cache_key).await.ok().flatten() {
            return Ok(category);
        }

        let category = self
            .repo
            .get_by_slug(slug)
            .await
            .context("Failed to get category by slug")?
            .ok_or_else(|| CategoryServiceError::NotFound(slug.to_string()))?;

        let _ = self.cache.set(&cache_key, &category, self.cache_ttl).await;
        Ok(category)
    }

    /// Every category, alphabetical. Used by the storefront menu.
    pub async fn list_all(&self) -> Result<Vec<Category>, CategoryServiceError> {
        if let Some(list) = self
            .cache
            .get::<Vec<Category>>(CACHE_KEY_CATEGORY_ALL)
            .await
            .ok()
            .flatten()
        {
            return Ok(list);
        }

        let list = self.repo.list_all().await.context("Failed to list categories")?;
        let _ = self.cache.set(CACHE_KEY_CATEGORY_ALL, &list, self.cache_ttl).await;
        Ok(list)
    }

    /// Paged, sortable list for the admin grid
    pub async fn list(&self, query: &ListQuery) -> Result<PagedResult<Category>, CategoryServiceError> {
        let (items, total) = self.repo.list(query).await.context("Failed to list categories")?;
        Ok(PagedResult::new(items, total, query))
    }

    /// Update a category
    pub async fn update(
        &self,
        id: i64,
        input: UpdateCategoryInput,
    ) -> Result<Category, CategoryServiceError> {
        let mut category = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .ok_or_else(|| CategoryServiceError::NotFound(id.to_string()))?;

        if let Some(name) = input.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(CategoryServiceError::ValidationError(
                    "Category name cannot be empty".to_string(),
                ));
            }
            if !name.eq_ignore_ascii_case(&category.name)
                && self
                    .repo
                    .exists_by_name(&name)
                    .await
                    .context("Failed to check name uniqueness")?
            {
                return Err(CategoryServiceError::DuplicateName(name));
            }
            category.name = name;
        }

        if let Some(slug) = input.slug {
            let slug = generate_slug(&slug);
            if slug.is_empty() {
                return Err(CategoryServiceError::ValidationError(
                    "Category slug cannot be empty".to_string(),
                ));
            }
            if slug != category.slug
                && self
                    .repo
                    .exists_by_slug(&slug)
                    .await
                    .context("Failed to check slug uniqueness")?
            {
                return Err(CategoryServiceError::DuplicateSlug(slug));
            }
            category.slug = slug;
        }

        if let Some(description) = input.description {
            category.description = description;
        }
        if let Some(image) = input.image {
            category.image = Some(image).filter(|i| !i.trim().is_empty());
        }

        let updated = self
            .repo
            .update(&category)
            .await
            .context("Failed to update category")?;

        self.invalidate_cache().await;
        Ok(updated)
    }

    /// Delete a category that no product uses
    pub async fn delete(&self, id: i64) -> Result<(), CategoryServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .ok_or_else(|| CategoryServiceError::NotFound(id.to_string()))?;

        let products = self
            .repo
            .count_products(id)
            .await
            .context("Failed to count category products")?;
        if products > 0 {
            return Err(CategoryServiceError::HasProducts(products));
        }

        self.repo.delete(id).await.context("Failed to delete category")?;
        self.invalidate_cache().await;
        info!(category_id = id, "category deleted");
        Ok(())
    }

    async fn invalidate_cache(&self) {
        let _ = self
            .cache
            .delete_pattern(&format!("{}*", CACHE_KEY_CATEGORY_BY_ID))
            .await;
        let _ = self
            .cache
            .delete_pattern(&format!("{}*", CACHE_KEY_CATEGORY_BY_SLUG))
            .await;
        let _ = self.cache.delete(CACHE_KEY_CATEGORY_ALL).await;
    }
}

/// Generate a URL-friendly slug from a name
///
/// Lowercases, turns spaces and ASCII punctuation into hyphens, collapses
/// runs of hyphens and trims them from both ends. Non-ASCII letters are kept.
pub fn generate_slug(name: &str) -> String {
    let slug: String = name
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || (!c.is_ascii() && c.is_alphanumeric()) {
                c
            } else {
                '-'
            }
        })
        .collect();

    let mut result = String::with_capacity(slug.len());
    let mut prev_hyphen = false;
    for c in slug.chars() {
        if c == '-' {
            if !prev_hyphen && !result.is_empty() {
                result.push(c);
                prev_hyphen = true;
            }
        } else {
            result.push(c);
            prev_hyphen = false;
        }
    }

    result.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::create_cache;
    use crate::config::CacheConfig;
    use crate::db::repositories::SqlxCategoryRepository;
    use crate::db::{create_test_pool, migrations, DatabasePool, DynDatabasePool};
    use proptest::prelude::*;

    async fn setup_test_service() -> (DynDatabasePool, CategoryService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let repo = SqlxCategoryRepository::boxed(pool.clone());
        let cache = create_cache(&CacheConfig::default());
        (pool, CategoryService::new(repo, cache))
    }

    #[test]
    fn test_generate_slug() {
        assert_eq!(generate_slug("National Teams"), "national-teams");
        assert_eq!(generate_slug("Retro, 90s!"), "retro-90s");
        assert_eq!(generate_slug("  Club   Kits  "), "club-kits");
        assert_eq!(generate_slug("home_kit"), "home-kit");
        assert_eq!(generate_slug("नेपाल Kit"), "नेपाल-kit");
        assert_eq!(generate_slug("!!!"), "");
    }

    #[tokio::test]
    async fn test_create_generates_slug() {
        let (_pool, service) = setup_test_service().await;

        let category = service
            .create(CreateCategoryInput::new("National Teams").with_description("Country kits"))
            .await
            .unwrap();

        assert_eq!(category.slug, "national-teams");
        assert_eq!(category.description, "Country kits");
        assert_eq!(service.get_by_slug("national-teams").await.unwrap().id, category.id);
    }

    #[tokio::test]
    async fn test_duplicate_name_and_slug() {
        let (_pool, service) = setup_test_service().await;
        service.create(CreateCategoryInput::new("Club")).await.unwrap();

        assert!(matches!(
            service.create(CreateCategoryInput::new("club")).await,
            Err(CategoryServiceError::DuplicateName(_))
        ));
        assert!(matches!(
            service
                .create(CreateCategoryInput::new("Club Kits").with_slug("club"))
                .await,
            Err(CategoryServiceError::DuplicateSlug(_))
        ));
        assert!(matches!(
            service.create(CreateCategoryInput::new("   ")).await,
            Err(CategoryServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_update_refreshes_cache() {
        let (_pool, service) = setup_test_service().await;
        let created = service.create(CreateCategoryInput::new("Retro")).await.unwrap();

        // warm the cache
        service.get_by_id(created.id).await.unwrap();
        assert_eq!(service.list_all().await.unwrap().len(), 1);

        service
            .update(
                created.id,
                UpdateCategoryInput {
                    name: Some("Retro Classics".to_string()),
                    slug: Some("retro-classics".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let fetched = service.get_by_id(created.id).await.unwrap();
        assert_eq!(fetched.name, "Retro Classics");
        assert_eq!(service.list_all().await.unwrap()[0].slug, "retro-classics");
        assert!(matches!(
            service.get_by_slug("retro").await,
            Err(CategoryServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_with_products_conflicts() {
        let (pool, service) = setup_test_service().await;
        let used = service.create(CreateCategoryInput::new("Club")).await.unwrap();
        let empty = service.create(CreateCategoryInput::new("Retro")).await.unwrap();

        pool.execute(&format!(
            "INSERT INTO products (name, slug, category_id, price, stock) VALUES ('Home Kit', 'home-kit', {}, 350000, 5)",
            used.id
        ))
        .await
        .unwrap();

        assert!(matches!(
            service.delete(used.id).await,
            Err(CategoryServiceError::HasProducts(1))
        ));

        service.delete(empty.id).await.unwrap();
        assert!(matches!(
            service.get_by_id(empty.id).await,
            Err(CategoryServiceError::NotFound(_))
        ));
        assert!(matches!(
            service.delete(empty.id).await,
            Err(CategoryServiceError::NotFound(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_slug_is_url_safe(name in "[A-Za-z0-9 _,.!-]{0,40}") {
            let slug = generate_slug(&name);
            prop_assert!(!slug.starts_with('-'));
            prop_assert!(!slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
            prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }

        #[test]
        fn prop_slug_is_idempotent(name in "[A-Za-z0-9 _-]{0,40}") {
            let once = generate_slug(&name);
            prop_assert_eq!(generate_slug(&once), once.clone());
        }
    }
}
