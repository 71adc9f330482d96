//! Review service
//!
//! One review per customer per product. Every create, edit or delete
//! recomputes the product's average rating and review count.

use crate::db::repositories::{ProductRepository, ReviewRepository};
use crate::models::{
    average_rating, CreateReviewInput, ListQuery, PagedResult, Review, UpdateReviewInput, User,
    MAX_COMMENT_LEN, MAX_RATING, MIN_RATING,
};
use crate::services::product::ProductService;
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

/// Error types for review operations
#[derive(Debug, thiserror::Error)]
pub enum ReviewServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// The user already reviewed this product
    #[error("You have already reviewed this product")]
    AlreadyReviewed,

    /// Editing someone else's review
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Review service
pub struct ReviewService {
    repo: Arc<dyn ReviewRepository>,
    product_repo: Arc<dyn ProductRepository>,
    products: Arc<ProductService>,
}

impl ReviewService {
    pub fn new(
        repo: Arc<dyn ReviewRepository>,
        product_repo: Arc<dyn ProductRepository>,
        products: Arc<ProductService>,
    ) -> Self {
        Self {
            repo,
            product_repo,
            products,
        }
    }

    /// Write a review of a product
    pub async fn create(
        &self,
        user: &User,
        product_id: i64,
        input: CreateReviewInput,
    ) -> Result<Review, ReviewServiceError> {
        validate_rating(input.rating)?;
        let comment = validate_comment(&input.comment)?;

        self.product_repo
            .get_by_id(product_id)
            .await
            .context("Failed to get product")?
            .ok_or_else(|| ReviewServiceError::NotFound(format!("product {}", product_id)))?;

        if self
            .repo
            .get_by_product_and_user(product_id, user.id)
            .await
            .context("Failed to check existing review")?
            .is_some()
        {
            return Err(ReviewServiceError::AlreadyReviewed);
        }

        let now = Utc::now();
        let review = Review {
            id: 0,
            product_id,
            user_id: user.id,
            user_name: user.name.clone(),
            rating: input.rating,
            comment,
            created_at: now,
            updated_at: now,
        };
        let created = self.repo.create(&review).await.context("Failed to create review")?;

        self.refresh_rating(product_id).await?;
        info!(review_id = created.id, product_id, user_id = user.id, "review added");
        Ok(created)
    }

    /// Reviews of one product, newest first
    pub async fn list_for_product(
        &self,
        product_id: i64,
        query: &ListQuery,
    ) -> Result<PagedResult<Review>, ReviewServiceError> {
        let query = query.clone().with_filter("product_id", product_id);
        self.list(&query).await
    }

    /// Admin list of every review
    pub async fn list(&self, query: &ListQuery) -> Result<PagedResult<Review>, ReviewServiceError> {
        let (items, total) = self.repo.list(query).await.context("Failed to list reviews")?;
        Ok(PagedResult::new(items, total, query))
    }

    /// Get review by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Review, ReviewServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get review")?
            .ok_or_else(|| ReviewServiceError::NotFound(format!("review {}", id)))
    }

    /// Edit one's own review
    pub async fn update(
        &self,
        user: &User,
        id: i64,
        input: UpdateReviewInput,
    ) -> Result<Review, ReviewServiceError> {
        let mut review = self.get_by_id(id).await?;
        if review.user_id != user.id {
            return Err(ReviewServiceError::Forbidden(
                "You can only edit your own reviews".to_string(),
            ));
        }

        if let Some(rating) = input.rating {
            validate_rating(rating)?;
            review.rating = rating;
        }
        if let Some(comment) = input.comment {
            review.comment = validate_comment(&comment)?;
        }

        let updated = self.repo.update(&review).await.context("Failed to update review")?;
        self.refresh_rating(updated.product_id).await?;
        Ok(updated)
    }

    /// Delete a review: the author's own, or any for an admin
    pub async fn delete(&self, user: &User, id: i64) -> Result<(), ReviewServiceError> {
        let review = self.get_by_id(id).await?;
        if review.user_id != user.id && !user.is_admin() {
            return Err(ReviewServiceError::Forbidden(
                "You can only delete your own reviews".to_string(),
            ));
        }

        self.repo.delete(id).await.context("Failed to delete review")?;
        self.refresh_rating(review.product_id).await?;
        info!(review_id = id, product_id = review.product_id, "review deleted");
        Ok(())
    }

    async fn refresh_rating(&self, product_id: i64) -> Result<(), ReviewServiceError> {
        let ratings = self
            .repo
            .ratings_for_product(product_id)
            .await
            .context("Failed to load ratings")?;
        self.products
            .set_rating(product_id, average_rating(&ratings), ratings.len() as i64)
            .await
            .map_err(|e| ReviewServiceError::InternalError(anyhow::anyhow!(e)))
    }
}

fn validate_rating(rating: i64) -> Result<(), ReviewServiceError> {
    if !(MIN_RATING..=MAX_RATING).contains(&rating) {
        return Err(ReviewServiceError::ValidationError(format!(
            "Rating must be between {} and {}",
            MIN_RATING, MAX_RATING
        )));
    }
    Ok(())
}

fn validate_comment(comment: &str) -> Result<String, ReviewServiceError> {
    let comment = comment.trim();
    if comment.chars().count() > MAX_COMMENT_LEN {
        return Err(ReviewServiceError::ValidationError(format!(
            "Comment cannot exceed {} characters",
            MAX_COMMENT_LEN
        )));
    }
    Ok(comment.to_string())
}
