//! Order service
//!
//! Checkout and order fulfilment:
//! - placing an order from the request body or the server cart
//! - owner and admin views
//! - validated status transitions, with stock returned on cancellation
//!
//! Stock is reserved inside the order insert transaction, so a checkout
//! either takes every unit it asked for or none.

use crate::cache::{Cache, CacheLayer};
use crate::config::StoreConfig;
use crate::db::repositories::{CartRepository, OrderRepository, ProductRepository, StockError};
use crate::models::{
    normalize_size, ListQuery, NewOrder, NewOrderItem, Order, OrderStatus, PagedResult,
    PaymentMethod, PaymentStatus, PaymentUpdate, PlaceOrderInput, SortOrder, User,
    MAX_LINE_QUANTITY,
};
use crate::services::notification::{Audience, NotificationEvent, NotificationHub};
use anyhow::Context;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Error types for order operations
#[derive(Debug, thiserror::Error)]
pub enum OrderServiceError {
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Not enough units left for a line
    #[error("Insufficient stock for {0}")]
    InsufficientStock(String),

    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// The order is past the point where the requested change is allowed
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Order service
pub struct OrderService {
    repo: Arc<dyn OrderRepository>,
    product_repo: Arc<dyn ProductRepository>,
    cart_repo: Arc<dyn CartRepository>,
    cache: Arc<Cache>,
    notifications: NotificationHub,
    store: StoreConfig,
}

impl OrderService {
    pub fn new(
        repo: Arc<dyn OrderRepository>,
        product_repo: Arc<dyn ProductRepository>,
        cart_repo: Arc<dyn CartRepository>,
        cache: Arc<Cache>,
        notifications: NotificationHub,
        store: StoreConfig,
    ) -> Self {
        Self {
            repo,
            product_repo,
            cart_repo,
            cache,
            notifications,
            store,
        }
    }

    /// Place an order for `user`.
    ///
    /// Lines come from the request body; when it has none the server cart is
    /// used and emptied afterwards. Prices, names and images are snapshot
    /// from the live catalogue, never taken from the client.
    pub async fn place_order(
        &self,
        user: &User,
        input: PlaceOrderInput,
    ) -> Result<Order, OrderServiceError> {
        let missing = input.shipping.missing_fields();
        if !missing.is_empty() {
            return Err(OrderServiceError::ValidationError(format!(
                "Missing shipping fields: {}",
                missing.join(", ")
            )));
        }

        let from_cart = input.items.is_empty();
        let requested: Vec<(i64, String, i64)> = if from_cart {
            self.cart_repo
                .list_for_user(user.id)
                .await
                .context("Failed to load cart")?
                .into_iter()
                .map(|line| (line.product_id, line.size, line.quantity))
                .collect()
        } else {
            input
                .items
                .into_iter()
                .map(|item| (item.product_id, normalize_size(&item.size), item.quantity))
                .collect()
        };
        if requested.is_empty() {
            return Err(OrderServiceError::ValidationError("Cart is empty".to_string()));
        }
        for (_, _, quantity) in &requested {
            check_quantity(*quantity)?;
        }

        let items = self.snapshot_items(merge_lines(requested)).await?;
        let items_total: i64 = items.iter().map(|i| i.unit_price * i.quantity).sum();
        let shipping_fee = self.store.shipping_for(items_total);

        let new_order = NewOrder {
            user_id: user.id,
            payment_method: input.payment_method,
            items_total,
            shipping_fee,
            total_amount: items_total + shipping_fee,
            shipping: input.shipping,
            note: input.note.filter(|n| !n.trim().is_empty()),
            items,
        };

        let order = match self.repo.create(&new_order).await {
            Ok(order) => order,
            Err(StockError::Insufficient { product_id }) => {
                let name = new_order
                    .items
                    .iter()
                    .find(|i| i.product_id == product_id)
                    .map(|i| i.product_name.clone())
                    .unwrap_or_else(|| format!("product {}", product_id));
                warn!(user_id = user.id, product_id, "checkout rejected, stock ran out");
                return Err(OrderServiceError::InsufficientStock(name));
            }
            Err(StockError::Database(e)) => return Err(e.into()),
        };

        if from_cart {
            self.cart_repo
                .clear(user.id)
                .await
                .context("Failed to clear cart")?;
        }
        self.invalidate_products().await;

        info!(
            order_id = order.id,
            user_id = user.id,
            total = order.total_amount,
            method = %order.payment_method,
            "order placed"
        );
        self.notifications.publish(
            NotificationEvent::OrderCreated,
            Audience::Admins,
            json!({
                "order_id": order.id,
                "user_id": order.user_id,
                "customer": order.shipping.full_name,
                "total_amount": order.total_amount,
                "payment_method": order.payment_method,
            }),
        );
        Ok(order)
    }

    /// An order visible to `user`: their own, or any for an admin.
    ///
    /// Other customers' orders read as not found.
    pub async fn get_order(&self, user: &User, id: i64) -> Result<Order, OrderServiceError> {
        let order = self.get_by_id(id).await?;
        if order.user_id != user.id && !user.is_admin() {
            return Err(OrderServiceError::NotFound(id.to_string()));
        }
        Ok(order)
    }

    /// Get order by ID without an ownership check
    pub async fn get_by_id(&self, id: i64) -> Result<Order, OrderServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get order")?
            .ok_or_else(|| OrderServiceError::NotFound(id.to_string()))
    }

    /// The caller's orders, newest first
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<Order>, OrderServiceError> {
        Ok(self
            .repo
            .list_for_user(user_id)
            .await
            .context("Failed to list user orders")?)
    }

    /// Admin list of all orders
    pub async fn list(&self, query: &ListQuery) -> Result<PagedResult<Order>, OrderServiceError> {
        let (items, total) = self.repo.list(query).await.context("Failed to list orders")?;
        Ok(PagedResult::new(items, total, query))
    }

    /// Most recent orders for the dashboard
    pub async fn recent(&self, limit: i64) -> Result<Vec<Order>, OrderServiceError> {
        let mut query = ListQuery::default().with_sort("created_at", SortOrder::Desc);
        query.limit = limit;
        let (items, _) = self.repo.list(&query).await.context("Failed to list orders")?;
        Ok(items)
    }

    /// Admin status change.
    ///
    /// Setting the current status again is a no-op. Cancelling returns stock;
    /// delivering a cash-on-delivery order records it as paid.
    pub async fn update_status(
        &self,
        id: i64,
        status: OrderStatus,
    ) -> Result<Order, OrderServiceError> {
        let order = self.get_by_id(id).await?;
        if order.status == status {
            return Ok(order);
        }
        if !order.status.can_transition_to(status) {
            return Err(OrderServiceError::InvalidTransition {
                from: order.status,
                to: status,
            });
        }

        if status == OrderStatus::Cancelled {
            if !self.repo.cancel(id).await.context("Failed to cancel order")? {
                return Err(OrderServiceError::Conflict(
                    "Order is already cancelled".to_string(),
                ));
            }
            self.invalidate_products().await;
        } else {
            self.repo
                .update_status(id, status)
                .await
                .context("Failed to update order status")?;
        }

        if status == OrderStatus::Delivered
            && order.payment_method == PaymentMethod::Cod
            && !order.is_paid()
        {
            self.repo
                .update_payment(
                    id,
                    &PaymentUpdate {
                        payment_status: PaymentStatus::Paid,
                        payment_ref: None,
                        transaction_id: None,
                        paid_at: Some(Utc::now()),
                    },
                )
                .await
                .context("Failed to mark COD order paid")?;
        }

        let updated = self.get_by_id(id).await?;
        info!(order_id = id, from = %order.status, to = %status, "order status changed");
        self.publish_update(&updated);
        Ok(updated)
    }

    /// Customer cancellation of their own order, allowed while it is pending
    /// and unpaid with no gateway payment in flight
    pub async fn cancel(&self, user: &User, id: i64) -> Result<Order, OrderServiceError> {
        let order = self.get_by_id(id).await?;
        if order.user_id != user.id {
            return Err(OrderServiceError::NotFound(id.to_string()));
        }
        if order.status != OrderStatus::Pending {
            return Err(OrderServiceError::Conflict(format!(
                "Order is already {}",
                order.status
            )));
        }
        if order.is_paid() {
            return Err(OrderServiceError::Conflict(
                "Paid orders cannot be cancelled online; contact support".to_string(),
            ));
        }
        if order.payment_status == PaymentStatus::Pending {
            return Err(OrderServiceError::Conflict(
                "A payment is in progress for this order".to_string(),
            ));
        }

        if !self.repo.cancel(id).await.context("Failed to cancel order")? {
            return Err(OrderServiceError::Conflict(
                "Order is already cancelled".to_string(),
            ));
        }
        self.invalidate_products().await;

        let updated = self.get_by_id(id).await?;
        info!(order_id = id, user_id = user.id, "order cancelled by customer");
        self.publish_update(&updated);
        Ok(updated)
    }

    /// Total number of orders
    pub async fn count(&self) -> Result<i64, OrderServiceError> {
        Ok(self.repo.count().await?)
    }

    /// Order counts per status
    pub async fn count_by_status(&self) -> Result<HashMap<OrderStatus, i64>, OrderServiceError> {
        Ok(self.repo.count_by_status().await?)
    }

    /// Sum of paid order totals
    pub async fn revenue(&self) -> Result<i64, OrderServiceError> {
        Ok(self.repo.revenue().await?)
    }

    async fn snapshot_items(
        &self,
        lines: Vec<(i64, String, i64)>,
    ) -> Result<Vec<NewOrderItem>, OrderServiceError> {
        let mut items = Vec::with_capacity(lines.len());
        for (product_id, size, quantity) in lines {
            check_quantity(quantity)?;

            let product = self
                .product_repo
                .get_by_id(product_id)
                .await
                .context("Failed to get product")?
                .filter(|p| p.is_active)
                .ok_or_else(|| {
                    OrderServiceError::ValidationError(format!(
                        "Product {} is not available",
                        product_id
                    ))
                })?;

            if !product.offers_size(&size) {
                return Err(OrderServiceError::ValidationError(format!(
                    "{} is not available in size {}",
                    product.name, size
                )));
            }
            if product.stock < quantity {
                return Err(OrderServiceError::InsufficientStock(product.name));
            }

            items.push(NewOrderItem {
                product_id,
                image: product.primary_image().map(str::to_string),
                product_name: product.name,
                size,
                unit_price: product.price,
                quantity,
            });
        }
        Ok(items)
    }

    fn publish_update(&self, order: &Order) {
        self.notifications.publish(
            NotificationEvent::OrderUpdated,
            Audience::UserAndAdmins(order.user_id),
            json!({
                "order_id": order.id,
                "status": order.status,
                "payment_status": order.payment_status,
            }),
        );
    }

    async fn invalidate_products(&self) {
        let _ = self.cache.delete_pattern("product:*").await;
    }
}

fn check_quantity(quantity: i64) -> Result<(), OrderServiceError> {
    if (1..=MAX_LINE_QUANTITY).contains(&quantity) {
        Ok(())
    } else {
        Err(OrderServiceError::ValidationError(format!(
            "Quantity must be between 1 and {}",
            MAX_LINE_QUANTITY
        )))
    }
}

/// Merge repeated (product, size) lines, keeping first-seen order.
///
/// Sums saturate; the merged line is range-checked again afterwards.
fn merge_lines(lines: Vec<(i64, String, i64)>) -> Vec<(i64, String, i64)> {
    let mut merged: Vec<(i64, String, i64)> = Vec::with_capacity(lines.len());
    for (product_id, size, quantity) in lines {
        match merged
            .iter_mut()
            .find(|(p, s, _)| *p == product_id && *s == size)
        {
            Some(line) => line.2 = line.2.saturating_add(quantity),
            None => merged.push((product_id, size, quantity)),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::create_cache;
    use crate::config::CacheConfig;
    use crate::db::repositories::{
        SqlxCartRepository, SqlxOrderRepository, SqlxProductRepository,
    };
    use crate::db::{create_test_pool, migrations, DatabasePool, DynDatabasePool};
    use crate::models::{CheckoutItemInput, ShippingAddress, UserRole};

    struct Fixture {
        pool: DynDatabasePool,
        service: OrderService,
        cart: Arc<dyn CartRepository>,
        customer: User,
        admin: User,
    }

    fn user(id: i64, role: UserRole) -> User {
        let mut user = User::new(
            format!("User {}", id),
            format!("user{}@example.com", id),
            "h".to_string(),
            role,
        );
        user.id = id;
        user
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        for sql in [
            "INSERT INTO users (id, name, email, password_hash, role) VALUES (1, 'Admin', 'admin@example.com', 'h', 'admin')",
            "INSERT INTO users (id, name, email, password_hash) VALUES (2, 'Ram', 'ram@example.com', 'h')",
            "INSERT INTO users (id, name, email, password_hash) VALUES (3, 'Sita', 'sita@example.com', 'h')",
            "INSERT INTO products (id, name, slug, price, stock, sizes) VALUES (10, 'Nepal Home', 'nepal-home', 250000, 5, ',M,L,')",
            "INSERT INTO products (id, name, slug, price, stock, sizes) VALUES (11, 'Retro Away', 'retro-away', 100000, 1, ',M,')",
            "INSERT INTO product_images (product_id, url, sort_order) VALUES (10, '/uploads/nepal.jpg', 0)",
        ] {
            pool.execute(sql).await.expect("Failed to seed");
        }

        let cart = SqlxCartRepository::boxed(pool.clone());
        let service = OrderService::new(
            SqlxOrderRepository::boxed(pool.clone()),
            SqlxProductRepository::boxed(pool.clone()),
            cart.clone(),
            create_cache(&CacheConfig::default()),
            NotificationHub::new(),
            StoreConfig::default(),
        );

        Fixture {
            pool,
            service,
            cart,
            customer: user(2, UserRole::Customer),
            admin: user(1, UserRole::Admin),
        }
    }

    fn shipping() -> ShippingAddress {
        ShippingAddress {
            full_name: "Ram Thapa".to_string(),
            phone: "9800000000".to_string(),
            address: "Lakeside".to_string(),
            city: "Pokhara".to_string(),
        }
    }

    fn checkout(lines: &[(i64, &str, i64)], method: PaymentMethod) -> PlaceOrderInput {
        PlaceOrderInput {
            items: lines
                .iter()
                .map(|(product_id, size, quantity)| CheckoutItemInput {
                    product_id: *product_id,
                    size: size.to_string(),
                    quantity: *quantity,
                })
                .collect(),
            shipping: shipping(),
            payment_method: method,
            note: None,
        }
    }

    async fn stock_of(pool: &DynDatabasePool, id: i64) -> i64 {
        let repo = SqlxProductRepository::new(pool.clone());
        repo.get_by_id(id).await.unwrap().unwrap().stock
    }

    #[tokio::test]
    async fn test_place_order_snapshots_and_reserves() {
        let f = setup().await;
        let mut rx = f.service.notifications.subscribe();

        let order = f
            .service
            .place_order(&f.customer, checkout(&[(10, "m", 1), (10, "M", 1)], PaymentMethod::Cod))
            .await
            .unwrap();

        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].quantity, 2);
        assert_eq!(order.items[0].image.as_deref(), Some("/uploads/nepal.jpg"));
        assert_eq!(order.items_total, 500_000);
        // at the free shipping threshold
        assert_eq!(order.shipping_fee, 0);
        assert_eq!(order.total_amount, 500_000);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(stock_of(&f.pool, 10).await, 3);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, NotificationEvent::OrderCreated);
        assert_eq!(event.audience, Audience::Admins);
    }

    #[tokio::test]
    async fn test_shipping_fee_below_threshold() {
        let f = setup().await;
        let order = f
            .service
            .place_order(&f.customer, checkout(&[(11, "M", 1)], PaymentMethod::Esewa))
            .await
            .unwrap();
        assert_eq!(order.shipping_fee, 10_000);
        assert_eq!(order.total_amount, 110_000);
    }

    #[tokio::test]
    async fn test_place_order_from_cart_clears_it() {
        let f = setup().await;
        f.cart.insert_item(2, 10, "L", 2).await.unwrap();

        let order = f
            .service
            .place_order(&f.customer, checkout(&[], PaymentMethod::Cod))
            .await
            .unwrap();
        assert_eq!(order.item_count(), 2);
        assert!(f.cart.list_for_user(2).await.unwrap().is_empty());

        assert!(matches!(
            f.service.place_order(&f.customer, checkout(&[], PaymentMethod::Cod)).await,
            Err(OrderServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_place_order_validation() {
        let f = setup().await;

        let mut no_city = checkout(&[(10, "M", 1)], PaymentMethod::Cod);
        no_city.shipping.city = " ".to_string();
        let bad_size = checkout(&[(10, "XS", 1)], PaymentMethod::Cod);
        let zero = checkout(&[(10, "M", 0)], PaymentMethod::Cod);
        let unknown = checkout(&[(99, "M", 1)], PaymentMethod::Cod);

        for input in [no_city, bad_size, zero, unknown] {
            assert!(matches!(
                f.service.place_order(&f.customer, input).await,
                Err(OrderServiceError::ValidationError(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_insufficient_stock_takes_nothing() {
        let f = setup().await;

        let result = f
            .service
            .place_order(&f.customer, checkout(&[(10, "M", 2), (11, "M", 2)], PaymentMethod::Cod))
            .await;
        assert!(matches!(result, Err(OrderServiceError::InsufficientStock(name)) if name == "Retro Away"));
        assert_eq!(stock_of(&f.pool, 10).await, 5);
        assert_eq!(stock_of(&f.pool, 11).await, 1);
    }

    #[tokio::test]
    async fn test_get_order_visibility() {
        let f = setup().await;
        let order = f
            .service
            .place_order(&f.customer, checkout(&[(10, "M", 1)], PaymentMethod::Cod))
            .await
            .unwrap();

        assert!(f.service.get_order(&f.customer, order.id).await.is_ok());
        assert!(f.service.get_order(&f.admin, order.id).await.is_ok());
        assert!(matches!(
            f.service.get_order(&user(3, UserRole::Customer), order.id).await,
            Err(OrderServiceError::NotFound(_))
        ));
        assert_eq!(f.service.list_for_user(2).await.unwrap().len(), 1);
        assert!(f.service.list_for_user(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_flow_and_cod_paid_on_delivery() {
        let f = setup().await;
        let order = f
            .service
            .place_order(&f.customer, checkout(&[(10, "M", 1)], PaymentMethod::Cod))
            .await
            .unwrap();

        assert!(matches!(
            f.service.update_status(order.id, OrderStatus::Delivered).await,
            Err(OrderServiceError::InvalidTransition { .. })
        ));

        for status in [OrderStatus::Processing, OrderStatus::Shipped] {
            f.service.update_status(order.id, status).await.unwrap();
        }
        let delivered = f
            .service
            .update_status(order.id, OrderStatus::Delivered)
            .await
            .unwrap();

        assert_eq!(delivered.status, OrderStatus::Delivered);
        assert!(delivered.is_paid());
        assert!(delivered.paid_at.is_some());
        assert!(delivered.delivered_at.is_some());
        assert_eq!(f.service.revenue().await.unwrap(), delivered.total_amount);

        // repeating the current status changes nothing
        let again = f
            .service
            .update_status(order.id, OrderStatus::Delivered)
            .await
            .unwrap();
        assert_eq!(again.status, OrderStatus::Delivered);
    }

    #[tokio::test]
    async fn test_admin_cancel_restores_stock() {
        let f = setup().await;
        let order = f
            .service
            .place_order(&f.customer, checkout(&[(10, "M", 3)], PaymentMethod::Cod))
            .await
            .unwrap();
        f.service.update_status(order.id, OrderStatus::Processing).await.unwrap();
        assert_eq!(stock_of(&f.pool, 10).await, 2);

        let cancelled = f
            .service
            .update_status(order.id, OrderStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(stock_of(&f.pool, 10).await, 5);

        let counts = f.service.count_by_status().await.unwrap();
        assert_eq!(counts.get(&OrderStatus::Cancelled), Some(&1));
    }

    #[tokio::test]
    async fn test_customer_cancel_rules() {
        let f = setup().await;
        let first = f
            .service
            .place_order(&f.customer, checkout(&[(10, "M", 1)], PaymentMethod::Cod))
            .await
            .unwrap();
        let second = f
            .service
            .place_order(&f.customer, checkout(&[(10, "M", 1)], PaymentMethod::Cod))
            .await
            .unwrap();

        assert!(matches!(
            f.service.cancel(&user(3, UserRole::Customer), first.id).await,
            Err(OrderServiceError::NotFound(_))
        ));

        let cancelled = f.service.cancel(&f.customer, first.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(stock_of(&f.pool, 10).await, 4);

        f.service.update_status(second.id, OrderStatus::Processing).await.unwrap();
        assert!(matches!(
            f.service.cancel(&f.customer, second.id).await,
            Err(OrderServiceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_cancels_restore_stock_once() {
        let f = setup().await;
        let order = f
            .service
            .place_order(&f.customer, checkout(&[(10, "M", 2)], PaymentMethod::Cod))
            .await
            .unwrap();
        assert_eq!(stock_of(&f.pool, 10).await, 3);

        let (by_customer, by_admin) = tokio::join!(
            f.service.cancel(&f.customer, order.id),
            f.service.update_status(order.id, OrderStatus::Cancelled),
        );
        assert_eq!(by_customer.is_ok() as u8 + by_admin.is_ok() as u8, 1);
        let loser = if by_customer.is_ok() { by_admin } else { by_customer };
        assert!(matches!(loser, Err(OrderServiceError::Conflict(_))));
        assert_eq!(stock_of(&f.pool, 10).await, 5);

        assert!(matches!(
            f.service.cancel(&f.customer, order.id).await,
            Err(OrderServiceError::Conflict(_))
        ));
        assert_eq!(stock_of(&f.pool, 10).await, 5);
    }

    #[tokio::test]
    async fn test_cancel_refused_while_payment_pending() {
        let f = setup().await;
        let order = f
            .service
            .place_order(&f.customer, checkout(&[(10, "M", 1)], PaymentMethod::Esewa))
            .await
            .unwrap();
        f.service
            .repo
            .update_payment(
                order.id,
                &PaymentUpdate {
                    payment_status: PaymentStatus::Pending,
                    payment_ref: Some(format!("JN-{}-261018120000", order.id)),
                    transaction_id: None,
                    paid_at: None,
                },
            )
            .await
            .unwrap();

        assert!(matches!(
            f.service.cancel(&f.customer, order.id).await,
            Err(OrderServiceError::Conflict(msg)) if msg.contains("payment")
        ));
        let order = f.service.get_by_id(order.id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(stock_of(&f.pool, 10).await, 4);
    }

    #[tokio::test]
    async fn test_oversized_quantities_rejected_before_merge() {
        let f = setup().await;

        let overflowing = checkout(&[(10, "M", i64::MAX), (10, "M", 1)], PaymentMethod::Cod);
        let over_cap = checkout(&[(10, "M", 21)], PaymentMethod::Cod);
        let merged_over_cap = checkout(&[(10, "M", 15), (10, "M", 15)], PaymentMethod::Cod);

        for input in [overflowing, over_cap, merged_over_cap] {
            assert!(matches!(
                f.service.place_order(&f.customer, input).await,
                Err(OrderServiceError::ValidationError(_))
            ));
        }
        assert_eq!(stock_of(&f.pool, 10).await, 5);
    }

    #[test]
    fn test_merge_lines_saturates() {
        let merged = merge_lines(vec![(1, "M".to_string(), i64::MAX), (1, "M".to_string(), 1)]);
        assert_eq!(merged, vec![(1, "M".to_string(), i64::MAX)]);
        assert!(check_quantity(merged[0].2).is_err());
    }

    #[test]
    fn test_merge_lines() {
        let merged = merge_lines(vec![
            (1, "M".to_string(), 1),
            (2, "M".to_string(), 1),
            (1, "M".to_string(), 2),
            (1, "L".to_string(), 1),
        ]);
        assert_eq!(
            merged,
            vec![
                (1, "M".to_string(), 3),
                (2, "M".to_string(), 1),
                (1, "L".to_string(), 1),
            ]
        );
    }
}
