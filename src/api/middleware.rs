//! API middleware
//!
//! Contains:
//! - Shared application state
//! - The `ApiError` envelope and service error mappings
//! - Authentication (session token from bearer header or cookie)
//! - Authorization (admin-only routes)

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};

use crate::cache::create_cache;
use crate::config::Config;
use crate::db::repositories::{
    SqlxBlogRepository, SqlxCartRepository, SqlxCategoryRepository, SqlxOrderRepository,
    SqlxProductRepository, SqlxReviewRepository, SqlxSessionRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{ListQueryError, User};
use crate::services::{
    BlogService, BlogServiceError, CartService, CartServiceError, CategoryService,
    CategoryServiceError, GatewayError, LoginRateLimiter, NotificationHub, OrderService,
    OrderServiceError, PaymentService, PaymentServiceError, ProductService, ProductServiceError,
    ReviewService, ReviewServiceError, UserService, UserServiceError,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub config: Arc<Config>,
    pub user_service: Arc<UserService>,
    pub category_service: Arc<CategoryService>,
    pub product_service: Arc<ProductService>,
    pub cart_service: Arc<CartService>,
    pub order_service: Arc<OrderService>,
    pub review_service: Arc<ReviewService>,
    pub blog_service: Arc<BlogService>,
    pub payment_service: Arc<PaymentService>,
    pub notifications: NotificationHub,
    pub rate_limiter: Arc<LoginRateLimiter>,
}

impl AppState {
    /// Wire repositories, cache and services over a migrated pool
    pub fn new(pool: DynDatabasePool, config: Config) -> anyhow::Result<Self> {
        let cache = create_cache(&config.cache);
        let notifications = NotificationHub::new();

        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        let category_repo = SqlxCategoryRepository::boxed(pool.clone());
        let product_repo = SqlxProductRepository::boxed(pool.clone());
        let cart_repo = SqlxCartRepository::boxed(pool.clone());
        let order_repo = SqlxOrderRepository::boxed(pool.clone());
        let review_repo = SqlxReviewRepository::boxed(pool.clone());
        let blog_repo = SqlxBlogRepository::boxed(pool.clone());

        let user_service = Arc::new(UserService::new(
            user_repo,
            session_repo,
            order_repo.clone(),
            notifications.clone(),
            &config.auth,
        ));
        let category_service = Arc::new(CategoryService::new(category_repo.clone(), cache.clone()));
        let product_service = Arc::new(ProductService::new(
            product_repo.clone(),
            category_repo,
            cache.clone(),
        ));
        let cart_service = Arc::new(CartService::new(cart_repo.clone(), product_repo.clone()));
        let order_service = Arc::new(OrderService::new(
            order_repo.clone(),
            product_repo.clone(),
            cart_repo,
            cache,
            notifications.clone(),
            config.store.clone(),
        ));
        let review_service = Arc::new(ReviewService::new(
            review_repo,
            product_repo,
            product_service.clone(),
        ));
        let blog_service = Arc::new(BlogService::new(blog_repo));
        let payment_service = Arc::new(PaymentService::new(
            order_repo,
            &config.payment,
            notifications.clone(),
        )?);

        Ok(Self {
            pool,
            config: Arc::new(config),
            user_service,
            category_service,
            product_service,
            cart_service,
            order_service,
            review_service,
            blog_service,
            payment_service,
            notifications,
            rate_limiter: Arc::new(LoginRateLimiter::new()),
        })
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// The user behind the request, if any. Filled by [`optional_auth`].
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

impl MaybeUser {
    pub fn is_admin(&self) -> bool {
        self.0.as_ref().is_some_and(User::is_admin)
    }
}

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            parts.extensions.get::<AuthenticatedUser>().map(|u| u.0.clone()),
        ))
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: u64) -> Self {
        Self::with_details(
            "RATE_LIMITED",
            message,
            serde_json::json!({ "retry_after": retry_after }),
        )
    }

    pub fn payment_error(message: impl Into<String>) -> Self {
        Self::new("PAYMENT_ERROR", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    /// Log the cause and hide it from the client
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        error!(error = %cause, "request failed");
        Self::internal_error("Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMITED" => StatusCode::TOO_MANY_REQUESTS,
            "PAYMENT_ERROR" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<ListQueryError> for ApiError {
    fn from(e: ListQueryError) -> Self {
        ApiError::validation_error(e.to_string())
    }
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(_) => ApiError::conflict(e.to_string()),
            UserServiceError::NotFound(_) => ApiError::not_found(e.to_string()),
            UserServiceError::Conflict(msg) => ApiError::conflict(msg),
            UserServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<CategoryServiceError> for ApiError {
    fn from(e: CategoryServiceError) -> Self {
        match e {
            CategoryServiceError::NotFound(_) => ApiError::not_found(e.to_string()),
            CategoryServiceError::DuplicateName(_)
            | CategoryServiceError::DuplicateSlug(_)
            | CategoryServiceError::HasProducts(_) => ApiError::conflict(e.to_string()),
            CategoryServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            CategoryServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<ProductServiceError> for ApiError {
    fn from(e: ProductServiceError) -> Self {
        match e {
            ProductServiceError::NotFound(_) => ApiError::not_found(e.to_string()),
            ProductServiceError::DuplicateSlug(_) => ApiError::conflict(e.to_string()),
            ProductServiceError::CategoryNotFound(_) => ApiError::validation_error(e.to_string()),
            ProductServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ProductServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<CartServiceError> for ApiError {
    fn from(e: CartServiceError) -> Self {
        match e {
            CartServiceError::NotFound(_) => ApiError::not_found(e.to_string()),
            CartServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            CartServiceError::InsufficientStock { available, .. } => ApiError::with_details(
                "VALIDATION_ERROR",
                e.to_string(),
                serde_json::json!({ "available": available }),
            ),
            CartServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<OrderServiceError> for ApiError {
    fn from(e: OrderServiceError) -> Self {
        match e {
            OrderServiceError::NotFound(_) => ApiError::not_found(e.to_string()),
            OrderServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            OrderServiceError::InsufficientStock(_)
            | OrderServiceError::InvalidTransition { .. } => ApiError::conflict(e.to_string()),
            OrderServiceError::Conflict(msg) => ApiError::conflict(msg),
            OrderServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<ReviewServiceError> for ApiError {
    fn from(e: ReviewServiceError) -> Self {
        match e {
            ReviewServiceError::NotFound(_) => ApiError::not_found(e.to_string()),
            ReviewServiceError::AlreadyReviewed => ApiError::conflict(e.to_string()),
            ReviewServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            ReviewServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ReviewServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<BlogServiceError> for ApiError {
    fn from(e: BlogServiceError) -> Self {
        match e {
            BlogServiceError::NotFound(_) => ApiError::not_found(e.to_string()),
            BlogServiceError::DuplicateSlug(_) => ApiError::conflict(e.to_string()),
            BlogServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            BlogServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<PaymentServiceError> for ApiError {
    fn from(e: PaymentServiceError) -> Self {
        match e {
            PaymentServiceError::NotFound(_) => ApiError::not_found(e.to_string()),
            PaymentServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            PaymentServiceError::Conflict(msg) => ApiError::conflict(msg),
            PaymentServiceError::Gateway(
                gateway @ (GatewayError::InvalidSignature | GatewayError::InvalidResponse(_)),
            ) => ApiError::validation_error(gateway.to_string()),
            PaymentServiceError::Gateway(gateway) => {
                warn!(error = %gateway, "payment gateway call failed");
                ApiError::payment_error(gateway.to_string())
            }
            PaymentServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

/// Session token from `Authorization: Bearer` or the `session` cookie.
/// The bearer header wins when both are present.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    if let Some(cookie_header) = headers.get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                if let Some(token) = cookie.trim().strip_prefix("session=") {
                    if !token.is_empty() {
                        return Some(token.to_string());
                    }
                }
            }
        }
    }

    None
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = session_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state
        .user_service
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    if user.is_banned() {
        return Err(ApiError::forbidden("Your account has been suspended"));
    }

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Optional authentication middleware
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = session_token(request.headers()) {
        if let Ok(Some(user)) = state.user_service.validate_session(&token).await {
            if !user.is_banned() {
                request.extensions_mut().insert(AuthenticatedUser(user));
            }
        }
    }
    next.run(request).await
}

/// Admin authorization middleware
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.is_admin() {
        return Err(ApiError::forbidden("Admin privileges required"));
    }

    Ok(next.run(request).await)
}
