//! Payment API endpoints
//!
//! - POST /api/payments/esewa/initiate - Signed form fields for eSewa
//! - POST /api/payments/esewa/verify - Reconcile the base64 `data` eSewa
//!   appends to the success or failure URL
//! - POST /api/payments/khalti/initiate - Khalti payment URL
//! - POST /api/payments/khalti/verify - Reconcile by `pidx`
//!
//! Verification returns the order as it stands afterwards, so the storefront
//! reads `payment_status` to decide what to show.

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::Order;
use crate::services::payment::{EsewaInitiation, KhaltiInitiation};

/// Body of both initiate endpoints
#[derive(Debug, Deserialize)]
pub struct InitiatePaymentRequest {
    #[serde(alias = "orderId")]
    pub order_id: i64,
}

/// Body of `POST /api/payments/esewa/verify`
#[derive(Debug, Deserialize)]
pub struct EsewaVerifyRequest {
    pub data: String,
}

/// Body of `POST /api/payments/khalti/verify`
#[derive(Debug, Deserialize)]
pub struct KhaltiVerifyRequest {
    pub pidx: String,
}

/// Build the payments router (requires auth)
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/esewa/initiate", post(esewa_initiate))
        .route("/esewa/verify", post(esewa_verify))
        .route("/khalti/initiate", post(khalti_initiate))
        .route("/khalti/verify", post(khalti_verify))
}

async fn esewa_initiate(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<InitiatePaymentRequest>,
) -> Result<Json<EsewaInitiation>, ApiError> {
    let initiation = state
        .payment_service
        .esewa_initiate(&user.0, body.order_id)
        .await?;
    Ok(Json(initiation))
}

async fn esewa_verify(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<EsewaVerifyRequest>,
) -> Result<Json<Order>, ApiError> {
    let order = state.payment_service.esewa_verify(&user.0, &body.data).await?;
    Ok(Json(order))
}

async fn khalti_initiate(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<InitiatePaymentRequest>,
) -> Result<Json<KhaltiInitiation>, ApiError> {
    let initiation = state
        .payment_service
        .khalti_initiate(&user.0, body.order_id)
        .await?;
    Ok(Json(initiation))
}

async fn khalti_verify(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<KhaltiVerifyRequest>,
) -> Result<Json<Order>, ApiError> {
    let order = state.payment_service.khalti_verify(&user.0, &body.pidx).await?;
    Ok(Json(order))
}
