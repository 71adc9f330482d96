//! Cart API endpoints
//!
//! The server-side cart of the logged-in customer:
//! - GET /api/cart - Lines with `totalItems` and `totalPrice`
//! - POST /api/cart/items - Add a product in a size
//! - PUT /api/cart/items/{id} - Set the quantity (0 removes the line)
//! - DELETE /api/cart/items/{id} - Remove a line
//! - DELETE /api/cart - Empty the cart

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{AddCartItemInput, Cart};

/// Body of `PUT /api/cart/items/{id}`
#[derive(Debug, Deserialize)]
pub struct UpdateCartItemRequest {
    pub quantity: i64,
}

/// Build the cart router (requires auth)
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart).delete(clear_cart))
        .route("/items", post(add_item))
        .route("/items/{id}", put(update_item).delete(remove_item))
}

async fn get_cart(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Cart>, ApiError> {
    Ok(Json(state.cart_service.get_cart(user.0.id).await?))
}

async fn add_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<AddCartItemInput>,
) -> Result<(StatusCode, Json<Cart>), ApiError> {
    let cart = state.cart_service.add_item(user.0.id, body).await?;
    Ok((StatusCode::CREATED, Json(cart)))
}

async fn update_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateCartItemRequest>,
) -> Result<Json<Cart>, ApiError> {
    let cart = state
        .cart_service
        .update_item(user.0.id, id, body.quantity)
        .await?;
    Ok(Json(cart))
}

async fn remove_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Cart>, ApiError> {
    Ok(Json(state.cart_service.remove_item(user.0.id, id).await?))
}

async fn clear_cart(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<StatusCode, ApiError> {
    state.cart_service.clear(user.0.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
