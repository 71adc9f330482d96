//! API layer - HTTP handlers and routing
//!
//! This module contains all HTTP endpoints of the JerseyNexus store, mounted
//! under `/api`:
//! - Auth and user administration
//! - Catalogue (products, categories, reviews)
//! - Cart, orders and payments (eSewa, Khalti)
//! - Blog posts
//! - Admin dashboard and image upload
//! - WebSocket notifications and health check
//!
//! Routes are grouped by who may call them. Each group carries its own
//! auth layer and the groups are merged, so one resource path can serve
//! public reads and admin writes.

pub mod admin;
pub mod auth;
pub mod blogs;
pub mod cart;
pub mod categories;
pub mod common;
pub mod health;
pub mod middleware;
pub mod orders;
pub mod payments;
pub mod products;
pub mod reviews;
pub mod upload;
pub mod users;
pub mod ws;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::warn;

pub use middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};

/// Headroom over the largest upload for multipart framing
const BODY_LIMIT_SLACK: usize = 64 * 1024;

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Admin routes (need admin role)
    let admin_routes = Router::new()
        .nest("/admin", admin::router())
        .nest("/users", users::admin_router())
        .nest("/products", products::admin_router())
        .nest("/categories", categories::admin_router())
        .nest("/orders", orders::admin_router())
        .nest("/reviews", reviews::admin_router())
        .nest("/blogs", blogs::admin_router())
        .nest("/upload", upload::admin_router())
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Protected routes (need auth but not admin)
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .nest("/cart", cart::router())
        .nest("/orders", orders::protected_router())
        .nest("/products", products::protected_router())
        .nest("/reviews", reviews::protected_router())
        .nest("/payments", payments::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Public routes
    Router::new()
        .nest("/auth", auth::public_router())
        .nest("/products", products::public_router())
        .nest("/categories", categories::public_router())
        .nest("/blogs", blogs::public_router())
        .nest("/ws", ws::router())
        .nest("/health", health::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::optional_auth,
        ))
        .merge(admin_routes)
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    let upload_dir = state.config.upload.path.clone();
    let body_limit = state.config.upload.max_file_size as usize + BODY_LIMIT_SLACK;

    Router::new()
        .nest("/api", build_api_router(state.clone()))
        .nest_service("/uploads", ServeDir::new(upload_dir))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer(&state.config.cors_origins()))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS for the storefront and admin origins, with cookie credentials
fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .expose_headers([
            header::CONTENT_RANGE,
            HeaderName::from_static(common::X_TOTAL_COUNT),
        ])
        .allow_credentials(true)
}
