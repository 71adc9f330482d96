//! Order model
//!
//! An order snapshots product name, price and image into its items at
//! checkout, so later catalogue edits never change what a customer paid for.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fulfilment state of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Allowed moves: pending → processing → shipped → delivered, and
    /// anything not yet delivered (or already cancelled) → cancelled.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Shipped)
                | (Shipped, Delivered)
                | (Pending, Cancelled)
                | (Processing, Cancelled)
                | (Shipped, Cancelled)
        )
    }

    /// No further transitions possible
    pub fn is_final(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl FromStr for OrderStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
            _ => Err(anyhow::anyhow!("Invalid order status: {}", s)),
        }
    }
}

/// Payment state of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Nothing attempted yet (and the state COD orders sit in until delivery)
    #[default]
    Unpaid,
    /// Sent to a gateway, awaiting verification
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

impl FromStr for PaymentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            _ => Err(anyhow::anyhow!("Invalid payment status: {}", s)),
        }
    }
}

/// How the customer pays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Cash on delivery
    #[default]
    Cod,
    Esewa,
    Khalti,
}

impl PaymentMethod {
    /// Paid through an online gateway
    pub fn is_online(self) -> bool {
        !matches!(self, PaymentMethod::Cod)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentMethod::Cod => "cod",
            PaymentMethod::Esewa => "esewa",
            PaymentMethod::Khalti => "khalti",
        };
        f.write_str(s)
    }
}

impl FromStr for PaymentMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cod" | "cash" => Ok(PaymentMethod::Cod),
            "esewa" => Ok(PaymentMethod::Esewa),
            "khalti" => Ok(PaymentMethod::Khalti),
            _ => Err(anyhow::anyhow!("Invalid payment method: {}", s)),
        }
    }
}

/// Delivery details captured at checkout
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    #[serde(alias = "fullName")]
    pub full_name: String,
    pub phone: String,
    pub address: String,
    pub city: String,
}

impl ShippingAddress {
    /// Names of the blank fields, in declaration order
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.full_name.trim().is_empty() {
            missing.push("full_name");
        }
        if self.phone.trim().is_empty() {
            missing.push("phone");
        }
        if self.address.trim().is_empty() {
            missing.push("address");
        }
        if self.city.trim().is_empty() {
            missing.push("city");
        }
        missing
    }
}

/// A placed order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    /// Gateway reference for the latest attempt (eSewa transaction_uuid, Khalti pidx)
    pub payment_ref: Option<String>,
    /// Gateway transaction id once paid
    pub transaction_id: Option<String>,
    pub items_total: i64,
    pub shipping_fee: i64,
    pub total_amount: i64,
    pub shipping: ShippingAddress,
    pub note: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

impl Order {
    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }

    /// An online payment may (still) be started for this order
    pub fn is_payable(&self) -> bool {
        self.payment_method.is_online()
            && self.status != OrderStatus::Cancelled
            && !matches!(
                self.payment_status,
                PaymentStatus::Paid | PaymentStatus::Refunded
            )
    }

    /// Total item count
    pub fn item_count(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// Human-readable label sent to gateways
    pub fn display_name(&self) -> String {
        format!("JerseyNexus Order #{}", self.id)
    }
}

/// A line of an order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    /// None once the product has been deleted
    pub product_id: Option<i64>,
    pub product_name: String,
    pub size: String,
    pub unit_price: i64,
    pub quantity: i64,
    pub image: Option<String>,
}

impl OrderItem {
    pub fn line_total(&self) -> i64 {
        self.unit_price * self.quantity
    }
}

/// Order ready to be persisted, built by the checkout service
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: i64,
    pub payment_method: PaymentMethod,
    pub items_total: i64,
    pub shipping_fee: i64,
    pub total_amount: i64,
    pub shipping: ShippingAddress,
    pub note: Option<String>,
    pub items: Vec<NewOrderItem>,
}

/// Order line ready to be persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_id: i64,
    pub product_name: String,
    pub size: String,
    pub unit_price: i64,
    pub quantity: i64,
    pub image: Option<String>,
}

/// One requested line in a checkout body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutItemInput {
    #[serde(alias = "product_id")]
    pub product_id: i64,
    pub size: String,
    pub quantity: i64,
}

/// Checkout request body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderInput {
    /// Explicit lines; when empty the server cart is used
    #[serde(default, alias = "order_items", alias = "orderItems")]
    pub items: Vec<CheckoutItemInput>,
    #[serde(alias = "shipping_address", alias = "shippingAddress")]
    pub shipping: ShippingAddress,
    #[serde(default, alias = "payment_method")]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub note: Option<String>,
}

/// Payment fields written by reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentUpdate {
    pub payment_status: PaymentStatus,
    pub payment_ref: Option<String>,
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}
