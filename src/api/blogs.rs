//! Blog API endpoints
//!
//! Handles HTTP requests for blog posts:
//! - GET /api/blogs - Published posts (admins also see drafts)
//! - GET /api/blogs/{id}, /api/blogs/slug/{slug} - One post
//! - POST /api/blogs - Create (admin, authored by the caller)
//! - PUT /api/blogs/{id} - Update (admin)
//! - DELETE /api/blogs/{id} - Delete (admin)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::api::common::{Deleted, ListRequest, Listed};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};
use crate::models::{Blog, CreateBlogInput, UpdateBlogInput};

/// Build public blog routes
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_blogs))
        .route("/{id}", get(get_blog))
        .route("/slug/{slug}", get(get_blog_by_slug))
}

/// Build admin blog routes
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_blog))
        .route("/{id}", axum::routing::put(update_blog).delete(delete_blog))
}

async fn list_blogs(
    State(state): State<AppState>,
    viewer: MaybeUser,
    ListRequest(query): ListRequest,
) -> Result<Listed<Blog>, ApiError> {
    let page = state.blog_service.list(&query, viewer.is_admin()).await?;
    Ok(Listed::new("blogs", page))
}

async fn get_blog(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<i64>,
) -> Result<Json<Blog>, ApiError> {
    Ok(Json(state.blog_service.get_by_id(id, viewer.is_admin()).await?))
}

async fn get_blog_by_slug(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(slug): Path<String>,
) -> Result<Json<Blog>, ApiError> {
    let blog = state
        .blog_service
        .get_by_slug(&slug, viewer.is_admin())
        .await?;
    Ok(Json(blog))
}

async fn create_blog(
    State(state): State<AppState>,
    author: AuthenticatedUser,
    Json(body): Json<CreateBlogInput>,
) -> Result<(StatusCode, Json<Blog>), ApiError> {
    let blog = state.blog_service.create(author.0.id, body).await?;
    Ok((StatusCode::CREATED, Json(blog)))
}

async fn update_blog(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateBlogInput>,
) -> Result<Json<Blog>, ApiError> {
    Ok(Json(state.blog_service.update(id, body).await?))
}

async fn delete_blog(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Deleted>, ApiError> {
    state.blog_service.delete(id).await?;
    Ok(Json(Deleted { id }))
}
