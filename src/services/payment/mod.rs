//! Payment service
//!
//! Starts eSewa and Khalti payments for orders and reconciles what the
//! gateways report back:
//! - a complete payment for the exact order total marks the order paid
//! - pending or initiated payments leave the order untouched
//! - refunds are recorded as refunded
//! - anything else marks the payment failed; the order stays payable
//!
//! Verifying an order that is already paid returns it unchanged.

pub mod esewa;
pub mod khalti;

pub use esewa::{EsewaCallback, EsewaForm, EsewaGateway, EsewaInitiation};
pub use khalti::{KhaltiCustomer, KhaltiGateway, KhaltiInitiation, KhaltiLookup};

use crate::config::PaymentConfig;
use crate::db::repositories::OrderRepository;
use crate::models::{Order, OrderStatus, PaymentMethod, PaymentStatus, PaymentUpdate, User};
use crate::services::notification::{Audience, NotificationEvent, NotificationHub};
use anyhow::Context;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Timeout for calls to gateway APIs
const GATEWAY_TIMEOUT_SECS: u64 = 30;

/// Errors talking to a payment gateway
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Network or TLS failure
    #[error("Gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Gateway answered with a non-success status
    #[error("Gateway rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Gateway answered with something we cannot read
    #[error("Unexpected gateway response: {0}")]
    InvalidResponse(String),

    /// Callback signature does not match
    #[error("Payment signature is invalid")]
    InvalidSignature,

    /// Merchant credentials missing or unusable
    #[error("Payment gateway is not configured: {0}")]
    Config(String),
}

/// Error types for payment operations
#[derive(Debug, thiserror::Error)]
pub enum PaymentServiceError {
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Order cannot be paid (cancelled, already paid, other method)
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// What a gateway said about a payment, after our own checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Paid { transaction_id: Option<String> },
    Pending,
    Refunded,
    Failed(String),
}

/// Payment service
pub struct PaymentService {
    orders: Arc<dyn OrderRepository>,
    esewa: EsewaGateway,
    khalti: KhaltiGateway,
    notifications: NotificationHub,
}

impl PaymentService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        config: &PaymentConfig,
        notifications: NotificationHub,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("JerseyNexus/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(GATEWAY_TIMEOUT_SECS))
            .build()
            .context("Failed to build payment HTTP client")?;

        Ok(Self {
            orders,
            esewa: EsewaGateway::new(config.esewa.clone(), client.clone()),
            khalti: KhaltiGateway::new(config.khalti.clone(), client),
            notifications,
        })
    }

    /// Signed eSewa form for one of the user's orders
    pub async fn esewa_initiate(
        &self,
        user: &User,
        order_id: i64,
    ) -> Result<EsewaInitiation, PaymentServiceError> {
        let order = self.payable_order(user, order_id, PaymentMethod::Esewa).await?;
        let initiation = self.esewa.initiate(&order)?;

        self.record(
            &order,
            PaymentStatus::Pending,
            Some(initiation.fields.transaction_uuid.clone()),
            None,
        )
        .await?;
        info!(order_id, uuid = %initiation.fields.transaction_uuid, "eSewa payment started");
        Ok(initiation)
    }

    /// Reconcile an eSewa success or failure redirect
    pub async fn esewa_verify(&self, user: &User, data: &str) -> Result<Order, PaymentServiceError> {
        let callback = self.esewa.verify(data)?;

        let order = self
            .orders
            .get_by_payment_ref(&callback.transaction_uuid)
            .await
            .context("Failed to find order by transaction")?
            .ok_or_else(|| PaymentServiceError::NotFound(callback.transaction_uuid.clone()))?;
        ensure_visible(user, &order)?;

        if order.is_paid() {
            return Ok(order);
        }

        let outcome = self.esewa_outcome(&order, &callback).await?;
        self.apply(order, outcome).await
    }

    /// Khalti payment URL for one of the user's orders
    pub async fn khalti_initiate(
        &self,
        user: &User,
        order_id: i64,
    ) -> Result<KhaltiInitiation, PaymentServiceError> {
        let order = self.payable_order(user, order_id, PaymentMethod::Khalti).await?;
        let customer = KhaltiCustomer {
            name: order.shipping.full_name.clone(),
            email: user.email.clone(),
            phone: order.shipping.phone.clone(),
        };

        let initiation = self.khalti.initiate(&order, &customer).await?;
        self.record(&order, PaymentStatus::Pending, Some(initiation.pidx.clone()), None)
            .await?;
        Ok(initiation)
    }

    /// Reconcile a Khalti payment by `pidx`
    pub async fn khalti_verify(&self, user: &User, pidx: &str) -> Result<Order, PaymentServiceError> {
        let pidx = pidx.trim();
        if pidx.is_empty() {
            return Err(PaymentServiceError::ValidationError("pidx is required".to_string()));
        }

        let order = self
            .orders
            .get_by_payment_ref(pidx)
            .await
            .context("Failed to find order by pidx")?
            .ok_or_else(|| PaymentServiceError::NotFound(pidx.to_string()))?;
        ensure_visible(user, &order)?;

        if order.is_paid() {
            return Ok(order);
        }

        let lookup = self.khalti.lookup(pidx).await?;
        let outcome = khalti_outcome(&order, &lookup);
        self.apply(order, outcome).await
    }

    async fn esewa_outcome(
        &self,
        order: &Order,
        callback: &EsewaCallback,
    ) -> Result<PaymentOutcome, PaymentServiceError> {
        if callback.product_code != self.esewa.config().product_code {
            return Ok(PaymentOutcome::Failed("product code mismatch".to_string()));
        }
        if !callback.is_complete() {
            return Ok(match callback.status.to_uppercase().as_str() {
                "PENDING" | "AMBIGUOUS" => PaymentOutcome::Pending,
                "FULL_REFUND" | "PARTIAL_REFUND" => PaymentOutcome::Refunded,
                other => PaymentOutcome::Failed(format!("eSewa status {}", other)),
            });
        }
        if callback.total_amount != Some(order.total_amount) {
            return Ok(PaymentOutcome::Failed("amount mismatch".to_string()));
        }

        let mut transaction_id = callback.transaction_code.clone();
        if self.esewa.config().verify_status {
            let status = self
                .esewa
                .check_status(&callback.transaction_uuid, order.total_amount)
                .await?;
            match status.status.to_uppercase().as_str() {
                esewa::STATUS_COMPLETE => {
                    if transaction_id.is_none() {
                        transaction_id = status.ref_id;
                    }
                }
                "PENDING" | "AMBIGUOUS" => return Ok(PaymentOutcome::Pending),
                other => return Ok(PaymentOutcome::Failed(format!("eSewa status {}", other))),
            }
        }

        Ok(PaymentOutcome::Paid { transaction_id })
    }

    async fn apply(&self, order: Order, outcome: PaymentOutcome) -> Result<Order, PaymentServiceError> {
        match &outcome {
            PaymentOutcome::Pending => return Ok(order),
            PaymentOutcome::Paid { transaction_id } if order.status == OrderStatus::Cancelled => {
                // the money arrived after the order was cancelled; leave the
                // order alone so stock and status stay consistent
                warn!(
                    order_id = order.id,
                    method = %order.payment_method,
                    transaction_id = ?transaction_id,
                    "payment received for cancelled order, needs manual refund"
                );
                return Ok(order);
            }
            PaymentOutcome::Paid { transaction_id } => {
                self.record(&order, PaymentStatus::Paid, None, transaction_id.clone())
                    .await?;
                info!(order_id = order.id, method = %order.payment_method, "order paid");
            }
            PaymentOutcome::Refunded => {
                self.record(&order, PaymentStatus::Refunded, None, None).await?;
                info!(order_id = order.id, "payment refunded");
            }
            PaymentOutcome::Failed(reason) => {
                self.record(&order, PaymentStatus::Failed, None, None).await?;
                warn!(order_id = order.id, %reason, "payment failed");
            }
        }

        let updated = self
            .orders
            .get_by_id(order.id)
            .await
            .context("Failed to reload order")?
            .ok_or_else(|| PaymentServiceError::NotFound(order.id.to_string()))?;

        self.notifications.publish(
            NotificationEvent::PaymentUpdated,
            Audience::UserAndAdmins(updated.user_id),
            json!({
                "order_id": updated.id,
                "payment_status": updated.payment_status,
                "payment_method": updated.payment_method,
                "total_amount": updated.total_amount,
            }),
        );
        Ok(updated)
    }

    async fn record(
        &self,
        order: &Order,
        status: PaymentStatus,
        payment_ref: Option<String>,
        transaction_id: Option<String>,
    ) -> Result<(), PaymentServiceError> {
        let paid_at = (status == PaymentStatus::Paid).then(Utc::now);
        self.orders
            .update_payment(
                order.id,
                &PaymentUpdate {
                    payment_status: status,
                    payment_ref,
                    transaction_id,
                    paid_at,
                },
            )
            .await
            .context("Failed to record payment")?;
        Ok(())
    }

    async fn payable_order(
        &self,
        user: &User,
        order_id: i64,
        method: PaymentMethod,
    ) -> Result<Order, PaymentServiceError> {
        let order = self
            .orders
            .get_by_id(order_id)
            .await
            .context("Failed to get order")?
            .filter(|o| o.user_id == user.id)
            .ok_or_else(|| PaymentServiceError::NotFound(order_id.to_string()))?;

        if order.payment_method != method {
            return Err(PaymentServiceError::ValidationError(format!(
                "Order {} is set to pay with {}",
                order.id, order.payment_method
            )));
        }
        if !order.is_payable() {
            return Err(PaymentServiceError::Conflict(format!(
                "Order {} cannot be paid (status {}, payment {})",
                order.id, order.status, order.payment_status
            )));
        }
        Ok(order)
    }
}

/// Map a Khalti lookup onto an outcome for this order
pub fn khalti_outcome(order: &Order, lookup: &KhaltiLookup) -> PaymentOutcome {
    match lookup.status.as_str() {
        "Completed" if lookup.total_amount == order.total_amount => PaymentOutcome::Paid {
            transaction_id: lookup.transaction_id.clone(),
        },
        "Completed" => PaymentOutcome::Failed("amount mismatch".to_string()),
        "Pending" | "Initiated" => PaymentOutcome::Pending,
        "Refunded" | "Partially Refunded" => PaymentOutcome::Refunded,
        other => PaymentOutcome::Failed(format!("Khalti status {}", other)),
    }
}

fn ensure_visible(user: &User, order: &Order) -> Result<(), PaymentServiceError> {
    if order.user_id != user.id && !user.is_admin() {
        return Err(PaymentServiceError::NotFound(order.id.to_string()));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::spawn_fake;
    use super::*;
    use crate::config::{EsewaConfig, KhaltiConfig};
    use crate::db::repositories::SqlxOrderRepository;
    use crate::db::{create_test_pool, migrations, DatabasePool};
    use crate::models::UserRole;
    use axum::routing::post;
    use axum::{Json, Router};
    use data_encoding::BASE64;
    use serde_json::Value;
    use std::sync::Mutex;

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

    /// The seeded customer who owns every fixture order
    fn ram() -> User {
        let mut user = User::new(
            "Ram".to_string(),
            "ram@example.com".to_string(),
            "h".to_string(),
            UserRole::Customer,
        );
        user.id = 2;
        user
    }

    async fn setup(config: PaymentConfig) -> (PaymentService, Arc<dyn OrderRepository>) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        for sql in [
            "INSERT INTO users (id, name, email, password_hash) VALUES (2, 'Ram', 'ram@example.com', 'h')",
            "INSERT INTO users (id, name, email, password_hash) VALUES (3, 'Sita', 'sita@example.com', 'h')",
            "INSERT INTO orders (id, user_id, payment_method, items_total, shipping_fee, total_amount, shipping_name, shipping_phone, shipping_address, shipping_city) \
             VALUES (1, 2, 'esewa', 100000, 10000, 110000, 'Ram', '9800000001', 'Lakeside', 'Pokhara')",
            "INSERT INTO orders (id, user_id, payment_method, items_total, shipping_fee, total_amount, shipping_name, shipping_phone, shipping_address, shipping_city) \
             VALUES (2, 2, 'khalti', 250000, 10000, 260000, 'Ram', '9800000001', 'Lakeside', 'Pokhara')",
            "INSERT INTO orders (id, user_id, payment_method, items_total, shipping_fee, total_amount, shipping_name, shipping_phone, shipping_address, shipping_city) \
             VALUES (3, 2, 'cod', 100000, 10000, 110000, 'Ram', '9800000001', 'Lakeside', 'Pokhara')",
        ] {
            pool.execute(sql).await.expect("Failed to seed");
        }

        let orders = SqlxOrderRepository::boxed(pool);
        let service = PaymentService::new(orders.clone(), &config, NotificationHub::new())
            .expect("Failed to build payment service");
        (service, orders)
    }

    fn offline_esewa() -> PaymentConfig {
        PaymentConfig {
            esewa: EsewaConfig {
                verify_status: false,
                ..EsewaConfig::default()
            },
            khalti: KhaltiConfig::default(),
        }
    }

    /// Callback eSewa would send for a form we issued
    fn callback_for(form: &EsewaForm, status: &str, total_amount: &str) -> String {
        let names = "transaction_code,status,total_amount,transaction_uuid,product_code,signed_field_names";
        let message = esewa::signing_message(&[
            ("transaction_code", "000AWEO"),
            ("status", status),
            ("total_amount", total_amount),
            ("transaction_uuid", &form.transaction_uuid),
            ("product_code", &form.product_code),
            ("signed_field_names", names),
        ]);
        let signature = esewa::sign_message(&EsewaConfig::default().secret_key, &message).unwrap();
        let body = json!({
            "transaction_code": "000AWEO",
            "status": status,
            "total_amount": total_amount,
            "transaction_uuid": form.transaction_uuid,
            "product_code": form.product_code,
            "signed_field_names": names,
            "signature": signature,
        });
        BASE64.encode(body.to_string().as_bytes())
    }

    #[tokio::test]
    async fn test_esewa_initiate_and_verify_marks_paid() {
        let (service, orders) = setup(offline_esewa()).await;
        let ram = ram();
        let mut rx = service.notifications.subscribe();

        let init = service.esewa_initiate(&ram, 1).await.unwrap();
        assert_eq!(init.fields.total_amount, "1100");
        let pending = orders.get_by_id(1).await.unwrap().unwrap();
        assert_eq!(pending.payment_status, PaymentStatus::Pending);
        assert_eq!(pending.payment_ref.as_deref(), Some(init.fields.transaction_uuid.as_str()));

        let data = callback_for(&init.fields, "COMPLETE", "1,100.0");
        let paid = service.esewa_verify(&ram, &data).await.unwrap();
        assert!(paid.is_paid());
        assert_eq!(paid.transaction_id.as_deref(), Some("000AWEO"));
        assert!(paid.paid_at.is_some());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, NotificationEvent::PaymentUpdated);
        assert_eq!(event.audience, Audience::UserAndAdmins(2));

        // verifying again changes nothing
        let again = service.esewa_verify(&ram, &data).await.unwrap();
        assert_eq!(again.paid_at, paid.paid_at);
        assert!(matches!(
            service.esewa_initiate(&ram, 1).await,
            Err(PaymentServiceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_esewa_amount_mismatch_fails_and_stays_payable() {
        let (service, orders) = setup(offline_esewa()).await;
        let ram = ram();

        let init = service.esewa_initiate(&ram, 1).await.unwrap();
        let data = callback_for(&init.fields, "COMPLETE", "10");
        let failed = service.esewa_verify(&ram, &data).await.unwrap();
        assert_eq!(failed.payment_status, PaymentStatus::Failed);
        assert!(failed.is_payable());

        // a second attempt can start
        let retry = service.esewa_initiate(&ram, 1).await.unwrap();
        let stored = orders.get_by_id(1).await.unwrap().unwrap();
        assert_eq!(stored.payment_ref.as_deref(), Some(retry.fields.transaction_uuid.as_str()));
    }

    #[tokio::test]
    async fn test_esewa_pending_leaves_order_unchanged() {
        let (service, _) = setup(offline_esewa()).await;
        let ram = ram();

        let init = service.esewa_initiate(&ram, 1).await.unwrap();
        let data = callback_for(&init.fields, "PENDING", "1100");
        let order = service.esewa_verify(&ram, &data).await.unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_esewa_status_api_is_consulted() {
        let router = Router::new().route(
            "/status",
            axum::routing::get(|| async {
                Json(json!({"status": "NOT_FOUND", "ref_id": null}))
            }),
        );
        let base = spawn_fake(router).await;
        let config = PaymentConfig {
            esewa: EsewaConfig {
                status_url: format!("{}/status", base),
                ..EsewaConfig::default()
            },
            khalti: KhaltiConfig::default(),
        };
        let (service, _) = setup(config).await;
        let ram = ram();

        let init = service.esewa_initiate(&ram, 1).await.unwrap();
        let data = callback_for(&init.fields, "COMPLETE", "1100");
        let order = service.esewa_verify(&ram, &data).await.unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn test_payment_for_cancelled_order_is_not_applied() {
        let (service, orders) = setup(offline_esewa()).await;
        let ram = ram();
        let mut rx = service.notifications.subscribe();

        let init = service.esewa_initiate(&ram, 1).await.unwrap();
        assert!(orders.cancel(1).await.unwrap());

        let data = callback_for(&init.fields, "COMPLETE", "1100");
        let order = service.esewa_verify(&ram, &data).await.unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert!(order.paid_at.is_none());

        let stored = orders.get_by_id(1).await.unwrap().unwrap();
        assert!(!stored.is_paid());
        assert!(stored.transaction_id.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_initiate_guards() {
        let (service, _) = setup(offline_esewa()).await;
        let ram = ram();

        assert!(matches!(
            service.esewa_initiate(&user(3, UserRole::Customer), 1).await,
            Err(PaymentServiceError::NotFound(_))
        ));
        assert!(matches!(
            service.esewa_initiate(&ram, 2).await,
            Err(PaymentServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service.esewa_initiate(&ram, 3).await,
            Err(PaymentServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service.esewa_verify(&ram, "garbage").await,
            Err(PaymentServiceError::Gateway(GatewayError::InvalidResponse(_)))
        ));
    }

    #[tokio::test]
    async fn test_khalti_flow_against_fake() {
        let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let recorded = seen.clone();
        let router = Router::new()
            .route(
                "/epayment/initiate/",
                post(move |Json(body): Json<Value>| {
                    let recorded = recorded.clone();
                    async move {
                        recorded.lock().unwrap().push(body);
                        Json(json!({
                            "pidx": "HT6o6PEZRWFJ5ygavzHWd5",
                            "payment_url": "https://test-pay.khalti.com/?pidx=HT6o6PEZRWFJ5ygavzHWd5",
                            "expires_at": "2025-03-07T16:26:16.471649+05:45",
                            "expires_in": 1800
                        }))
                    }
                }),
            )
            .route(
                "/epayment/lookup/",
                post(|Json(body): Json<Value>| async move {
                    Json(json!({
                        "pidx": body["pidx"],
                        "total_amount": 260000,
                        "status": "Completed",
                        "transaction_id": "GFq9PFS7b2iYvL8Lir9oXe",
                        "fee": 0,
                        "refunded": false
                    }))
                }),
            );
        let base = spawn_fake(router).await;
        let config = PaymentConfig {
            esewa: EsewaConfig::default(),
            khalti: KhaltiConfig {
                secret_key: "test-secret".to_string(),
                base_url: base,
                ..KhaltiConfig::default()
            },
        };
        let (service, _) = setup(config).await;
        let ram = ram();

        let init = service.khalti_initiate(&ram, 2).await.unwrap();
        assert_eq!(init.pidx, "HT6o6PEZRWFJ5ygavzHWd5");
        {
            let bodies = seen.lock().unwrap();
            assert_eq!(bodies[0]["amount"], 260000);
            assert_eq!(bodies[0]["purchase_order_id"], "2");
            assert_eq!(bodies[0]["customer_info"]["email"], "ram@example.com");
        }

        let paid = service.khalti_verify(&ram, &init.pidx).await.unwrap();
        assert!(paid.is_paid());
        assert_eq!(paid.transaction_id.as_deref(), Some("GFq9PFS7b2iYvL8Lir9oXe"));
        assert_eq!(paid.status, OrderStatus::Pending);
        assert_eq!(seen.lock().unwrap()[0]["customer_info"]["name"], "Ram");

        assert!(matches!(
            service.khalti_verify(&ram, "unknown").await,
            Err(PaymentServiceError::NotFound(_))
        ));
    }

    #[test]
    fn test_khalti_outcome_mapping() {
        let now = Utc::now();
        let order = Order {
            id: 1,
            user_id: 1,
            status: OrderStatus::Pending,
            payment_method: PaymentMethod::Khalti,
            payment_status: PaymentStatus::Pending,
            payment_ref: Some("p".to_string()),
            transaction_id: None,
            items_total: 1000,
            shipping_fee: 0,
            total_amount: 1000,
            shipping: Default::default(),
            note: None,
            paid_at: None,
            delivered_at: None,
            created_at: now,
            updated_at: now,
            items: Vec::new(),
        };
        let lookup = |status: &str, amount: i64| KhaltiLookup {
            pidx: "p".to_string(),
            total_amount: amount,
            status: status.to_string(),
            transaction_id: Some("t".to_string()),
            fee: 0,
            refunded: false,
        };

        assert_eq!(
            khalti_outcome(&order, &lookup("Completed", 1000)),
            PaymentOutcome::Paid {
                transaction_id: Some("t".to_string())
            }
        );
        assert!(matches!(khalti_outcome(&order, &lookup("Completed", 999)), PaymentOutcome::Failed(_)));
        assert_eq!(khalti_outcome(&order, &lookup("Initiated", 1000)), PaymentOutcome::Pending);
        assert_eq!(khalti_outcome(&order, &lookup("Pending", 1000)), PaymentOutcome::Pending);
        assert_eq!(khalti_outcome(&order, &lookup("Refunded", 1000)), PaymentOutcome::Refunded);
        assert!(matches!(khalti_outcome(&order, &lookup("Expired", 1000)), PaymentOutcome::Failed(_)));
        assert!(matches!(khalti_outcome(&order, &lookup("User canceled", 1000)), PaymentOutcome::Failed(_)));
    }
}
