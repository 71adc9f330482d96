//! Order API endpoints
//!
//! Customers:
//! - POST /api/orders - Check out (explicit lines or the server cart)
//! - GET /api/orders/mine - Own orders, newest first
//! - GET /api/orders/{id} - One order (owner or admin)
//! - POST /api/orders/{id}/cancel - Cancel a pending order
//!
//! Admin:
//! - GET /api/orders - All orders
//! - PUT /api/orders/{id} - Move the order through its lifecycle

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{ListRequest, Listed};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Order, OrderStatus, PlaceOrderInput};

/// Body of `PUT /api/orders/{id}`
#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

/// Build order routes for logged-in customers
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/", post(place_order))
        .route("/mine", get(my_orders))
        .route("/{id}", get(get_order))
        .route("/{id}/cancel", post(cancel_order))
}

/// Build admin order routes
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/{id}", axum::routing::put(update_status))
}

/// POST /api/orders
async fn place_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<PlaceOrderInput>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state.order_service.place_order(&user.0, body).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /api/orders/mine
async fn my_orders(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.order_service.list_for_user(user.0.id).await?))
}

/// GET /api/orders/{id}
async fn get_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.order_service.get_order(&user.0, id).await?))
}

/// POST /api/orders/{id}/cancel
async fn cancel_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.order_service.cancel(&user.0, id).await?))
}

/// GET /api/orders
async fn list_orders(
    State(state): State<AppState>,
    ListRequest(query): ListRequest,
) -> Result<Listed<Order>, ApiError> {
    let page = state.order_service.list(&query).await?;
    Ok(Listed::new("orders", page))
}

/// PUT /api/orders/{id}
async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateOrderStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.order_service.update_status(id, body.status).await?))
}
