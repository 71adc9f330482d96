//! Cart model
//!
//! The server keeps one cart per user. Lines are unique per product and
//! size; totals are always derived from the lines, never stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Most units of one product and size a cart line or order line may hold
pub const MAX_LINE_QUANTITY: i64 = 20;

/// Stored cart line
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CartItem {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub size: String,
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Cart line joined with live product data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    /// Cart item ID
    pub id: i64,
    pub product_id: i64,
    pub name: String,
    pub slug: String,
    pub image: Option<String>,
    pub size: String,
    /// Current product price
    pub unit_price: i64,
    pub quantity: i64,
    /// Units currently available
    pub stock: i64,
}

impl CartLine {
    pub fn line_total(&self) -> i64 {
        self.unit_price.saturating_mul(self.quantity)
    }
}

/// The cart as returned to the storefront
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub items: Vec<CartLine>,
    /// Sum of line quantities
    pub total_items: i64,
    /// Sum of unit price × quantity, in paisa
    pub total_price: i64,
}

impl Cart {
    pub fn from_lines(items: Vec<CartLine>) -> Self {
        let total_items = items.iter().fold(0i64, |acc, l| acc.saturating_add(l.quantity));
        let total_price = items
            .iter()
            .fold(0i64, |acc, l| acc.saturating_add(l.line_total()));
        Self {
            items,
            total_items,
            total_price,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Request body for adding to the cart
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCartItemInput {
    #[serde(alias = "product_id")]
    pub product_id: i64,
    pub size: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: i64, price: i64, qty: i64) -> CartLine {
        CartLine {
            id,
            product_id: id,
            name: format!("Jersey {}", id),
            slug: format!("jersey-{}", id),
            image: None,
            size: "M".to_string(),
            unit_price: price,
            quantity: qty,
            stock: 10,
        }
    }

    #[test]
    fn test_cart_totals_saturate() {
        let cart = Cart::from_lines(vec![line(1, 250_000, i64::MAX), line(2, 100_000, 1)]);
        assert_eq!(cart.total_items, i64::MAX);
        assert_eq!(cart.total_price, i64::MAX);
    }

    #[test]
    fn test_cart_totals() {
        let cart = Cart::from_lines(vec![line(1, 250_000, 2), line(2, 100_000, 1)]);
        assert_eq!(cart.total_items, 3);
        assert_eq!(cart.total_price, 600_000);
    }

    #[test]
    fn test_cart_serializes_camel_case() {
        let cart = Cart::from_lines(vec![line(1, 100, 1)]);
        let json = serde_json::to_value(&cart).unwrap();
        assert_eq!(json["totalItems"], 1);
        assert_eq!(json["items"][0]["unitPrice"], 100);
    }

    #[test]
    fn test_add_input_accepts_both_casings() {
        let a: AddCartItemInput =
            serde_json::from_str(r#"{"productId":1,"size":"M","quantity":2}"#).unwrap();
        let b: AddCartItemInput = serde_json::from_str(r#"{"product_id":1,"size":"M"}"#).unwrap();
        assert_eq!(a.product_id, b.product_id);
        assert_eq!(b.quantity, 1);
    }
}
