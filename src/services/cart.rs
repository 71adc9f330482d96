//! Cart service
//!
//! Server-side cart mirrored by the storefront. Adding the same product and
//! size twice merges into one line; quantities never exceed live stock or
//! the per-line cap that checkout enforces.

use crate::db::repositories::{CartRepository, ProductRepository};
use crate::models::{normalize_size, AddCartItemInput, Cart, MAX_LINE_QUANTITY};
use anyhow::Context;
use std::sync::Arc;
use tracing::debug;

/// Error types for cart operations
#[derive(Debug, thiserror::Error)]
pub enum CartServiceError {
    /// Cart line or product not found
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Requested quantity is more than what is in stock
    #[error("Only {available} left in stock for {product}")]
    InsufficientStock { product: String, available: i64 },

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Cart service
pub struct CartService {
    repo: Arc<dyn CartRepository>,
    product_repo: Arc<dyn ProductRepository>,
}

impl CartService {
    pub fn new(repo: Arc<dyn CartRepository>, product_repo: Arc<dyn ProductRepository>) -> Self {
        Self { repo, product_repo }
    }

    /// The user's cart with totals
    pub async fn get_cart(&self, user_id: i64) -> Result<Cart, CartServiceError> {
        let lines = self
            .repo
            .list_for_user(user_id)
            .await
            .context("Failed to load cart")?;
        Ok(Cart::from_lines(lines))
    }

    /// Add a product in a size. An existing line for the same product and
    /// size gets its quantity increased.
    pub async fn add_item(
        &self,
        user_id: i64,
        input: AddCartItemInput,
    ) -> Result<Cart, CartServiceError> {
        if input.quantity < 1 {
            return Err(CartServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let product = self
            .product_repo
            .get_by_id(input.product_id)
            .await
            .context("Failed to get product")?
            .filter(|p| p.is_active)
            .ok_or_else(|| CartServiceError::NotFound(format!("product {}", input.product_id)))?;

        let size = normalize_size(&input.size);
        if !product.offers_size(&size) {
            return Err(CartServiceError::ValidationError(format!(
                "{} is not available in size {}",
                product.name, size
            )));
        }

        let existing = self
            .repo
            .find_item(user_id, product.id, &size)
            .await
            .context("Failed to look up cart line")?;
        let wanted = existing
            .as_ref()
            .map_or(0, |i| i.quantity)
            .checked_add(input.quantity)
            .filter(|q| *q <= MAX_LINE_QUANTITY)
            .ok_or_else(over_line_cap)?;

        if wanted > product.stock {
            return Err(CartServiceError::InsufficientStock {
                product: product.name,
                available: product.stock,
            });
        }

        match existing {
            Some(item) => self
                .repo
                .update_quantity(item.id, wanted)
                .await
                .context("Failed to update cart line")?,
            None => {
                self.repo
                    .insert_item(user_id, product.id, &size, wanted)
                    .await
                    .context("Failed to add cart line")?;
            }
        }

        debug!(user_id, product_id = product.id, %size, quantity = wanted, "cart line saved");
        self.get_cart(user_id).await
    }

    /// Set the quantity of a line; 0 removes it
    pub async fn update_item(
        &self,
        user_id: i64,
        item_id: i64,
        quantity: i64,
    ) -> Result<Cart, CartServiceError> {
        if quantity < 0 {
            return Err(CartServiceError::ValidationError(
                "Quantity cannot be negative".to_string(),
            ));
        }
        if quantity > MAX_LINE_QUANTITY {
            return Err(over_line_cap());
        }

        let item = self
            .repo
            .get_item(user_id, item_id)
            .await
            .context("Failed to get cart line")?
            .ok_or_else(|| CartServiceError::NotFound(format!("cart item {}", item_id)))?;

        if quantity == 0 {
            return self.remove_item(user_id, item_id).await;
        }

        let product = self
            .product_repo
            .get_by_id(item.product_id)
            .await
            .context("Failed to get product")?
            .ok_or_else(|| CartServiceError::NotFound(format!("product {}", item.product_id)))?;
        if quantity > product.stock {
            return Err(CartServiceError::InsufficientStock {
                product: product.name,
                available: product.stock,
            });
        }

        self.repo
            .update_quantity(item.id, quantity)
            .await
            .context("Failed to update cart line")?;
        self.get_cart(user_id).await
    }

    /// Remove one line
    pub async fn remove_item(&self, user_id: i64, item_id: i64) -> Result<Cart, CartServiceError> {
        let removed = self
            .repo
            .delete_item(user_id, item_id)
            .await
            .context("Failed to remove cart line")?;
        if !removed {
            return Err(CartServiceError::NotFound(format!("cart item {}", item_id)));
        }
        self.get_cart(user_id).await
    }

    /// Empty the cart
    pub async fn clear(&self, user_id: i64) -> Result<(), CartServiceError> {
        self.repo.clear(user_id).await.context("Failed to clear cart")?;
        Ok(())
    }
}

fn over_line_cap() -> CartServiceError {
    CartServiceError::ValidationError(format!(
        "At most {} of one item per size",
        MAX_LINE_QUANTITY
    ))
}
