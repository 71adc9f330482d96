//! Category API endpoints
//!
//! Handles HTTP requests for categories:
//! - GET /api/categories - List categories
//! - GET /api/categories/{id} - Get a category
//! - POST /api/categories - Create (admin)
//! - PUT /api/categories/{id} - Update (admin)
//! - DELETE /api/categories/{id} - Delete an empty category (admin)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::api::common::{Deleted, ListRequest, Listed};
use crate::api::middleware::{ApiError, AppState};
use crate::models::{Category, CreateCategoryInput, ListQuery, PagedResult, UpdateCategoryInput};

/// Build public category routes
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_categories))
        .route("/{id}", get(get_category))
}

/// Build admin category routes
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_category))
        .route("/{id}", axum::routing::put(update_category).delete(delete_category))
}

/// GET /api/categories
///
/// Without list parameters the whole (cached) list is returned, which is
/// what the storefront menu asks for.
async fn list_categories(
    State(state): State<AppState>,
    ListRequest(query): ListRequest,
) -> Result<Listed<Category>, ApiError> {
    if query == ListQuery::default() {
        let all = state.category_service.list_all().await?;
        let total = all.len() as i64;
        return Ok(Listed::new("categories", PagedResult::new(all, total, &query)));
    }
    let page = state.category_service.list(&query).await?;
    Ok(Listed::new("categories", page))
}

/// GET /api/categories/{id}
async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Category>, ApiError> {
    Ok(Json(state.category_service.get_by_id(id).await?))
}

/// POST /api/categories
async fn create_category(
    State(state): State<AppState>,
    Json(body): Json<CreateCategoryInput>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let category = state.category_service.create(body).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// PUT /api/categories/{id}
async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateCategoryInput>,
) -> Result<Json<Category>, ApiError> {
    Ok(Json(state.category_service.update(id, body).await?))
}

/// DELETE /api/categories/{id}
async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Deleted>, ApiError> {
    state.category_service.delete(id).await?;
    Ok(Json(Deleted { id }))
}
