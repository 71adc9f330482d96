//! Review API endpoints
//!
//! Reviews are written under `/api/products/{id}/reviews`; this module holds
//! the moderation and author routes:
//! - GET /api/reviews - All reviews (admin)
//! - GET /api/reviews/{id} - One review (admin)
//! - PUT /api/reviews/{id} - Edit own review
//! - DELETE /api/reviews/{id} - Delete own review (admins may delete any)

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::api::common::{Deleted, ListRequest, Listed};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Review, UpdateReviewInput};

/// Build review routes for logged-in customers
pub fn protected_router() -> Router<AppState> {
    Router::new().route(
        "/{id}",
        axum::routing::put(update_review).delete(delete_review),
    )
}

/// Build admin review routes
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_reviews))
        .route("/{id}", get(get_review))
}

async fn list_reviews(
    State(state): State<AppState>,
    ListRequest(query): ListRequest,
) -> Result<Listed<Review>, ApiError> {
    let page = state.review_service.list(&query).await?;
    Ok(Listed::new("reviews", page))
}

async fn get_review(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Review>, ApiError> {
    Ok(Json(state.review_service.get_by_id(id).await?))
}

async fn update_review(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateReviewInput>,
) -> Result<Json<Review>, ApiError> {
    Ok(Json(state.review_service.update(&user.0, id, body).await?))
}

async fn delete_review(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Deleted>, ApiError> {
    state.review_service.delete(&user.0, id).await?;
    Ok(Json(Deleted { id }))
}
