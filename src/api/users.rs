//! User admin API endpoints
//!
//! - GET /api/users - List users
//! - GET /api/users/{id} - Get a user
//! - PUT /api/users/{id} - Update role, status or profile
//! - DELETE /api/users/{id} - Delete a user without orders

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::api::common::{Deleted, ListRequest, Listed};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{AdminUpdateUserInput, User};

/// Build the users router (admin only)
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/{id}", get(get_user).put(update_user).delete(delete_user))
}

async fn list_users(
    State(state): State<AppState>,
    ListRequest(query): ListRequest,
) -> Result<Listed<User>, ApiError> {
    let page = state.user_service.list(&query).await?;
    Ok(Listed::new("users", page))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.user_service.get_by_id(id).await?))
}

async fn update_user(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<AdminUpdateUserInput>,
) -> Result<Json<User>, ApiError> {
    let updated = state.user_service.admin_update(&actor.0, id, body).await?;
    Ok(Json(updated))
}

async fn delete_user(
    State(state): State<AppState>,
    actor: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Deleted>, ApiError> {
    state.user_service.delete(&actor.0, id).await?;
    Ok(Json(Deleted { id }))
}
