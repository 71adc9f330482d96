//! Admin API endpoints
//!
//! - GET /api/admin/dashboard - Store overview for the back office
//!
//! The remaining admin operations live with their resources (`/api/users`,
//! `/api/orders`, ...) behind the admin route layer.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::api::middleware::{ApiError, AppState};
use crate::models::{format_rupees, Order, OrderStatus, Product};

/// Recent orders shown on the dashboard
const RECENT_ORDERS: i64 = 5;
/// Low-stock products shown on the dashboard
const LOW_STOCK_LIMIT: i64 = 10;

/// Response for dashboard stats
#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub total_users: i64,
    pub total_products: i64,
    pub total_orders: i64,
    /// Order count per status, every status present
    pub orders_by_status: BTreeMap<String, i64>,
    /// Paid revenue in paisa
    pub revenue: i64,
    /// Paid revenue as a rupee string
    pub revenue_display: String,
    pub low_stock_threshold: i64,
    pub low_stock: Vec<Product>,
    pub recent_orders: Vec<Order>,
    /// Open WebSocket subscriptions
    pub live_connections: usize,
}

/// Build the admin router
pub fn router() -> Router<AppState> {
    Router::new().route("/dashboard", get(get_dashboard))
}

/// GET /api/admin/dashboard
async fn get_dashboard(State(state): State<AppState>) -> Result<Json<DashboardResponse>, ApiError> {
    let threshold = state.config.store.low_stock_threshold;

    let total_users = state.user_service.count().await?;
    let total_products = state.product_service.count().await?;
    let total_orders = state.order_service.count().await?;
    let counts = state.order_service.count_by_status().await?;
    let revenue = state.order_service.revenue().await?;
    let low_stock = state.product_service.low_stock(threshold, LOW_STOCK_LIMIT).await?;
    let recent_orders = state.order_service.recent(RECENT_ORDERS).await?;

    Ok(Json(DashboardResponse {
        total_users,
        total_products,
        total_orders,
        orders_by_status: status_breakdown(&counts),
        revenue,
        revenue_display: format_rupees(revenue),
        low_stock_threshold: threshold,
        low_stock,
        recent_orders,
        live_connections: state.notifications.subscriber_count(),
    }))
}

fn status_breakdown(counts: &HashMap<OrderStatus, i64>) -> BTreeMap<String, i64> {
    [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ]
    .into_iter()
    .map(|status| (status.to_string(), counts.get(&status).copied().unwrap_or(0)))
    .collect()
}
