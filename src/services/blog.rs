//! Blog service
//!
//! Editorial posts. The storefront only ever sees published posts; the back
//! office sees drafts too.

use crate::db::repositories::BlogRepository;
use crate::models::{derive_excerpt, Blog, CreateBlogInput, ListQuery, PagedResult, UpdateBlogInput};
use crate::services::category::generate_slug;
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

/// Length of excerpts derived from content
const EXCERPT_CHARS: usize = 200;

/// Error types for blog operations
#[derive(Debug, thiserror::Error)]
pub enum BlogServiceError {
    #[error("Blog post not found: {0}")]
    NotFound(String),

    #[error("Blog slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Blog service
pub struct BlogService {
    repo: Arc<dyn BlogRepository>,
}

impl BlogService {
    pub fn new(repo: Arc<dyn BlogRepository>) -> Self {
        Self { repo }
    }

    /// Create a post. Publishing on create stamps `published_at`.
    pub async fn create(
        &self,
        author_id: i64,
        input: CreateBlogInput,
    ) -> Result<Blog, BlogServiceError> {
        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(BlogServiceError::ValidationError("Title cannot be empty".to_string()));
        }
        if input.content.trim().is_empty() {
            return Err(BlogServiceError::ValidationError("Content cannot be empty".to_string()));
        }

        let slug = generate_slug(input.slug.as_deref().unwrap_or(&title));
        if slug.is_empty() {
            return Err(BlogServiceError::ValidationError("Slug cannot be empty".to_string()));
        }
        if self
            .repo
            .exists_by_slug(&slug, None)
            .await
            .context("Failed to check slug uniqueness")?
        {
            return Err(BlogServiceError::DuplicateSlug(slug));
        }

        let excerpt = match input.excerpt.filter(|e| !e.trim().is_empty()) {
            Some(excerpt) => excerpt.trim().to_string(),
            None => derive_excerpt(&input.content, EXCERPT_CHARS),
        };

        let now = Utc::now();
        let blog = Blog {
            id: 0,
            title,
            slug,
            excerpt,
            content: input.content,
            cover_image: input.cover_image.filter(|c| !c.trim().is_empty()),
            author_id: Some(author_id),
            is_published: input.is_published,
            published_at: input.is_published.then_some(now),
            created_at: now,
            updated_at: now,
        };

        let created = self.repo.create(&blog).await.context("Failed to create blog post")?;
        info!(blog_id = created.id, slug = %created.slug, published = created.is_published, "blog post created");
        Ok(created)
    }

    /// Get a post by ID. Drafts are hidden unless `include_drafts`.
    pub async fn get_by_id(&self, id: i64, include_drafts: bool) -> Result<Blog, BlogServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get blog post")?
            .filter(|b| include_drafts || b.is_published)
            .ok_or_else(|| BlogServiceError::NotFound(id.to_string()))
    }

    /// Get a post by slug. Drafts are hidden unless `include_drafts`.
    pub async fn get_by_slug(&self, slug: &str, include_drafts: bool) -> Result<Blog, BlogServiceError> {
        self.repo
            .get_by_slug(slug)
            .await
            .context("Failed to get blog post")?
            .filter(|b| include_drafts || b.is_published)
            .ok_or_else(|| BlogServiceError::NotFound(slug.to_string()))
    }

    /// List posts. Without `include_drafts` only published posts are returned.
    pub async fn list(
        &self,
        query: &ListQuery,
        include_drafts: bool,
    ) -> Result<PagedResult<Blog>, BlogServiceError> {
        let query = if include_drafts {
            query.clone()
        } else {
            query.clone().with_filter("published", true)
        };
        let (items, total) = self.repo.list(&query).await.context("Failed to list blog posts")?;
        Ok(PagedResult::new(items, total, &query))
    }

    /// Update a post. `published_at` keeps the date of the first publish.
    pub async fn update(&self, id: i64, input: UpdateBlogInput) -> Result<Blog, BlogServiceError> {
        let mut blog = self.get_by_id(id, true).await?;

        if let Some(title) = input.title {
            let title = title.trim().to_string();
            if title.is_empty() {
                return Err(BlogServiceError::ValidationError("Title cannot be empty".to_string()));
            }
            blog.title = title;
        }
        if let Some(slug) = input.slug {
            let slug = generate_slug(&slug);
            if slug.is_empty() {
                return Err(BlogServiceError::ValidationError("Slug cannot be empty".to_string()));
            }
            if self
                .repo
                .exists_by_slug(&slug, Some(id))
                .await
                .context("Failed to check slug uniqueness")?
            {
                return Err(BlogServiceError::DuplicateSlug(slug));
            }
            blog.slug = slug;
        }
        if let Some(content) = input.content {
            if content.trim().is_empty() {
                return Err(BlogServiceError::ValidationError("Content cannot be empty".to_string()));
            }
            blog.content = content;
        }
        if let Some(excerpt) = input.excerpt {
            blog.excerpt = if excerpt.trim().is_empty() {
                derive_excerpt(&blog.content, EXCERPT_CHARS)
            } else {
                excerpt.trim().to_string()
            };
        }
        if let Some(cover) = input.cover_image {
            blog.cover_image = Some(cover).filter(|c| !c.trim().is_empty());
        }
        if let Some(published) = input.is_published {
            blog.is_published = published;
            if published && blog.published_at.is_none() {
                blog.published_at = Some(Utc::now());
            }
        }

        Ok(self.repo.update(&blog).await.context("Failed to update blog post")?)
    }

    /// Delete a post
    pub async fn delete(&self, id: i64) -> Result<(), BlogServiceError> {
        self.get_by_id(id, true).await?;
        self.repo.delete(id).await.context("Failed to delete blog post")?;
        info!(blog_id = id, "blog post deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxBlogRepository;
    use crate::db::{create_test_pool, migrations, DatabasePool};

    async fn setup_test_service() -> BlogService {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool.execute(
            "INSERT INTO users (id, name, email, password_hash, role) VALUES (1, 'Admin', 'a@example.com', 'h', 'admin')",
        )
        .await
        .expect("Failed to seed");
        BlogService::new(SqlxBlogRepository::boxed(pool))
    }

    fn post(title: &str, published: bool) -> CreateBlogInput {
        CreateBlogInput {
            title: title.to_string(),
            slug: None,
            excerpt: None,
            content: "The 2024 home kit goes on sale Friday.\n\nSizes S to XXL.".to_string(),
            cover_image: None,
            is_published: published,
        }
    }

    #[tokio::test]
    async fn test_create_derives_slug_and_excerpt() {
        let service = setup_test_service().await;

        let blog = service.create(1, post("New Home Kit!", true)).await.unwrap();
        assert_eq!(blog.slug, "new-home-kit");
        assert_eq!(blog.excerpt, "The 2024 home kit goes on sale Friday.");
        assert_eq!(blog.author_id, Some(1));
        assert!(blog.published_at.is_some());

        assert!(matches!(
            service.create(1, post("New home kit", false)).await,
            Err(BlogServiceError::DuplicateSlug(_))
        ));
    }

    #[tokio::test]
    async fn test_drafts_hidden_from_public() {
        let service = setup_test_service().await;
        service.create(1, post("Published", true)).await.unwrap();
        let draft = service.create(1, post("Draft", false)).await.unwrap();
        assert!(draft.published_at.is_none());

        let public = service.list(&ListQuery::default(), false).await.unwrap();
        assert_eq!(public.total, 1);
        let admin = service.list(&ListQuery::default(), true).await.unwrap();
        assert_eq!(admin.total, 2);

        assert!(matches!(
            service.get_by_slug("draft", false).await,
            Err(BlogServiceError::NotFound(_))
        ));
        assert!(service.get_by_id(draft.id, true).await.is_ok());
    }

    #[tokio::test]
    async fn test_published_at_set_once() {
        let service = setup_test_service().await;
        let draft = service.create(1, post("Kit Launch", false)).await.unwrap();

        let publish = UpdateBlogInput {
            is_published: Some(true),
            ..Default::default()
        };
        let first = service.update(draft.id, publish.clone()).await.unwrap();
        let stamped = first.published_at.expect("published_at should be set");

        service
            .update(
                draft.id,
                UpdateBlogInput {
                    is_published: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let again = service.update(draft.id, publish).await.unwrap();
        assert_eq!(again.published_at, Some(stamped));
    }

    #[tokio::test]
    async fn test_update_validation_and_delete() {
        let service = setup_test_service().await;
        let a = service.create(1, post("First", true)).await.unwrap();
        service.create(1, post("Second", true)).await.unwrap();

        assert!(matches!(
            service
                .update(
                    a.id,
                    UpdateBlogInput {
                        slug: Some("second".to_string()),
                        ..Default::default()
                    },
                )
                .await,
            Err(BlogServiceError::DuplicateSlug(_))
        ));
        assert!(matches!(
            service
                .update(
                    a.id,
                    UpdateBlogInput {
                        title: Some(" ".to_string()),
                        ..Default::default()
                    },
                )
                .await,
            Err(BlogServiceError::ValidationError(_))
        ));

        service.delete(a.id).await.unwrap();
        assert!(matches!(
            service.delete(a.id).await,
            Err(BlogServiceError::NotFound(_))
        ));
    }
}
