//! Authentication API endpoints
//!
//! Handles HTTP requests for user authentication:
//! - POST /api/auth/register - Register and log in
//! - POST /api/auth/login - Log in (rate limited)
//! - POST /api/auth/logout - End the current session
//! - GET /api/auth/me - Current user
//! - PUT /api/auth/profile - Update own profile
//! - PUT /api/auth/password - Change own password

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use std::net::IpAddr;
use tracing::{info, warn};

use crate::api::middleware::{session_token, ApiError, AppState, AuthenticatedUser};
use crate::models::{UpdateProfileInput, User};
use crate::services::user::{AuthSession, ChangePasswordInput, LoginInput, RegisterInput};
use crate::services::UserServiceError;

/// Seconds a client should wait after the IP limit trips
const IP_RETRY_AFTER_SECS: u64 = 60;

/// Seconds a client should wait after the email limit trips
const EMAIL_RETRY_AFTER_SECS: u64 = 15 * 60;

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(get_current_user))
        .route("/profile", put(update_profile))
        .route("/password", put(change_password))
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// POST /api/auth/register - Create an account and log it in
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterInput>,
) -> Result<impl IntoResponse, ApiError> {
    let auth = state.user_service.register(body).await?;
    let cookie = session_cookie(&state, &auth.session.id)?;

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(auth),
    ))
}

/// POST /api/auth/login - Log in with email and password
///
/// Limited to 10 requests per minute per client IP and 5 failed attempts per
/// 15 minutes per email.
async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LoginInput>,
) -> Result<impl IntoResponse, ApiError> {
    let email = body.email.trim().to_lowercase();

    if let Some(ip) = client_ip(&headers) {
        if state.rate_limiter.is_ip_limited(ip).await {
            warn!(%ip, "login rate limit hit for IP");
            return Err(ApiError::rate_limited(
                "Too many requests, please try again later",
                IP_RETRY_AFTER_SECS,
            ));
        }
        state.rate_limiter.record_ip_request(ip).await;
    }

    if state.rate_limiter.is_email_limited(&email).await {
        warn!(%email, "login rate limit hit for email");
        return Err(ApiError::rate_limited(
            "Too many failed attempts, please try again in 15 minutes",
            EMAIL_RETRY_AFTER_SECS,
        ));
    }

    let auth: AuthSession = match state.user_service.login(body).await {
        Ok(auth) => auth,
        Err(e @ UserServiceError::AuthenticationError(_)) => {
            state.rate_limiter.record_failed_attempt(&email).await;
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    state.rate_limiter.clear_email_attempts(&email).await;
    info!(user_id = auth.user.id, "user logged in");

    let cookie = session_cookie(&state, &auth.session.id)?;
    Ok(([(header::SET_COOKIE, cookie)], Json(auth)))
}

/// POST /api/auth/logout - Delete the session and clear the cookie
async fn logout(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = session_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    state.user_service.logout(&token).await?;

    let clear_cookie = "session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0";
    Ok((
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, HeaderValue::from_static(clear_cookie))],
    ))
}

/// GET /api/auth/me - Current user
async fn get_current_user(user: AuthenticatedUser) -> Json<User> {
    Json(user.0)
}

/// PUT /api/auth/profile - Update the current user's profile
async fn update_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<UpdateProfileInput>,
) -> Result<Json<User>, ApiError> {
    let updated = state.user_service.update_profile(user.0.id, body).await?;
    Ok(Json(updated))
}

/// PUT /api/auth/password - Change the current user's password
///
/// Other sessions of the user are ended; this one stays valid.
async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Json(body): Json<ChangePasswordInput>,
) -> Result<StatusCode, ApiError> {
    let token = session_token(&headers).unwrap_or_default();
    state
        .user_service
        .change_password(user.0.id, &token, body)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `Set-Cookie` value for a new session
fn session_cookie(state: &AppState, token: &str) -> Result<HeaderValue, ApiError> {
    let max_age = state.config.auth.session_days.max(1) * 24 * 60 * 60;
    HeaderValue::from_str(&format!(
        "session={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        token, max_age
    ))
    .map_err(ApiError::internal)
}

/// Client IP from proxy headers (`X-Forwarded-For`, then `X-Real-IP`)
fn client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(ip) = forwarded.split(',').next().and_then(|ip| ip.trim().parse().ok()) {
            return Some(ip);
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|ip| ip.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ip_prefers_first_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_ip(&headers), Some("203.0.113.7".parse().unwrap()));
    }

    #[test]
    fn test_client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("garbage"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_ip(&headers), Some("10.0.0.2".parse().unwrap()));

        assert_eq!(client_ip(&HeaderMap::new()), None);
    }
}
