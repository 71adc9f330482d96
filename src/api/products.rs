//! Product API endpoints
//!
//! Public:
//! - GET /api/products - Filtered list (inactive products only for admins)
//! - GET /api/products/{id}, /api/products/slug/{slug} - One product
//! - GET /api/products/{id}/reviews - Reviews of a product
//!
//! Authenticated:
//! - POST /api/products/{id}/reviews - Write a review
//!
//! Admin:
//! - POST /api/products, PUT/DELETE /api/products/{id}
//! - POST /api/products/{id}/images - Attach an uploaded file or a URL
//! - DELETE /api/products/{id}/images/{image_id}

use axum::{
    extract::{FromRequest, Multipart, Path, Request, State},
    http::{header, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{Deleted, ListRequest, Listed};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};
use crate::api::upload::store_image;
use crate::models::{
    CreateProductInput, CreateReviewInput, Product, ProductImage, Review, UpdateProductInput,
};
use crate::services::ProductServiceError;

/// JSON body for attaching an image that is already hosted
#[derive(Debug, Deserialize)]
pub struct ImageUrlRequest {
    pub url: String,
    #[serde(default)]
    pub alt: Option<String>,
}

/// Build public product routes
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products))
        .route("/{id}", get(get_product))
        .route("/slug/{slug}", get(get_product_by_slug))
        .route("/{id}/reviews", get(list_reviews))
}

/// Build product routes for logged-in customers
pub fn protected_router() -> Router<AppState> {
    Router::new().route("/{id}/reviews", post(create_review))
}

/// Build admin product routes
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_product))
        .route("/{id}", axum::routing::put(update_product).delete(delete_product))
        .route("/{id}/images", post(add_image))
        .route("/{id}/images/{image_id}", delete(delete_image))
}

/// GET /api/products
async fn list_products(
    State(state): State<AppState>,
    viewer: MaybeUser,
    ListRequest(query): ListRequest,
) -> Result<Listed<Product>, ApiError> {
    let page = state
        .product_service
        .list(&query, !viewer.is_admin())
        .await?;
    Ok(Listed::new("products", page))
}

/// GET /api/products/{id}
async fn get_product(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<i64>,
) -> Result<Json<Product>, ApiError> {
    let product = state.product_service.get_by_id(id).await?;
    visible(product, &viewer).map(Json)
}

/// GET /api/products/slug/{slug}
async fn get_product_by_slug(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(slug): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let product = state.product_service.get_by_slug(&slug).await?;
    visible(product, &viewer).map(Json)
}

/// Hidden products exist only for admins
fn visible(product: Product, viewer: &MaybeUser) -> Result<Product, ApiError> {
    if product.is_active || viewer.is_admin() {
        Ok(product)
    } else {
        Err(ProductServiceError::NotFound(product.id.to_string()).into())
    }
}

/// POST /api/products
async fn create_product(
    State(state): State<AppState>,
    Json(body): Json<CreateProductInput>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let product = state.product_service.create(body).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// PUT /api/products/{id}
async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateProductInput>,
) -> Result<Json<Product>, ApiError> {
    Ok(Json(state.product_service.update(id, body).await?))
}

/// DELETE /api/products/{id}
async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Deleted>, ApiError> {
    state.product_service.delete(id).await?;
    Ok(Json(Deleted { id }))
}

/// POST /api/products/{id}/images
///
/// Takes either a multipart upload (field `file`) or a JSON body
/// `{url, alt}` for an image hosted elsewhere.
async fn add_image(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<(StatusCode, Json<ProductImage>), ApiError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    // make sure the product exists before writing a file for it
    state.product_service.get_by_id(id).await?;

    let (url, alt) = if is_multipart {
        let mut multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::validation_error(e.body_text()))?;
        let stored = store_image(&state.config.upload, &mut multipart).await?;
        (stored.url, None)
    } else {
        let Json(body) = Json::<ImageUrlRequest>::from_request(request, &state)
            .await
            .map_err(|e| ApiError::validation_error(e.body_text()))?;
        (body.url, body.alt)
    };

    let image = state
        .product_service
        .add_image(id, &url, alt.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(image)))
}

/// DELETE /api/products/{id}/images/{image_id}
async fn delete_image(
    State(state): State<AppState>,
    Path((id, image_id)): Path<(i64, i64)>,
) -> Result<Json<Deleted>, ApiError> {
    state.product_service.delete_image(id, image_id).await?;
    Ok(Json(Deleted { id: image_id }))
}

/// GET /api/products/{id}/reviews
async fn list_reviews(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ListRequest(query): ListRequest,
) -> Result<Listed<Review>, ApiError> {
    let page = state.review_service.list_for_product(id, &query).await?;
    Ok(Listed::new("reviews", page))
}

/// POST /api/products/{id}/reviews
async fn create_review(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<CreateReviewInput>,
) -> Result<(StatusCode, Json<Review>), ApiError> {
    let review = state.review_service.create(&user.0, id, body).await?;
    Ok((StatusCode::CREATED, Json(review)))
}
