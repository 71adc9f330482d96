//! Khalti KPG-2
//!
//! Server-to-server: initiate returns a `pidx` and a hosted payment URL;
//! after the customer returns, `lookup` reports the final state. Amounts are
//! paisa on the wire.

use super::GatewayError;
use crate::config::KhaltiConfig;
use crate::models::Order;
use reqwest::header::AUTHORIZATION;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument};

/// Customer details shown on the Khalti checkout page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KhaltiCustomer {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// Successful initiation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KhaltiInitiation {
    pub pidx: String,
    pub payment_url: String,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// State of a payment as reported by lookup
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KhaltiLookup {
    pub pidx: String,
    /// Paisa
    pub total_amount: i64,
    /// `Completed`, `Pending`, `Initiated`, `Refunded`, `Expired`,
    /// `User canceled`, `Partially Refunded`
    pub status: String,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub fee: i64,
    #[serde(default)]
    pub refunded: bool,
}

/// Khalti client for one merchant
#[derive(Debug, Clone)]
pub struct KhaltiGateway {
    config: KhaltiConfig,
    client: reqwest::Client,
}

impl KhaltiGateway {
    pub fn new(config: KhaltiConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    /// Start a payment for an order
    #[instrument(skip(self, order, customer), fields(order_id = order.id, amount = order.total_amount))]
    pub async fn initiate(
        &self,
        order: &Order,
        customer: &KhaltiCustomer,
    ) -> Result<KhaltiInitiation, GatewayError> {
        let body = json!({
            "return_url": self.config.return_url,
            "website_url": self.config.website_url,
            "amount": order.total_amount,
            "purchase_order_id": order.id.to_string(),
            "purchase_order_name": order.display_name(),
            "customer_info": customer,
        });

        let initiation: KhaltiInitiation = self.post("epayment/initiate/", &body).await?;
        info!(pidx = %initiation.pidx, "Khalti payment initiated");
        Ok(initiation)
    }

    /// Current state of a payment
    #[instrument(skip(self))]
    pub async fn lookup(&self, pidx: &str) -> Result<KhaltiLookup, GatewayError> {
        self.post("epayment/lookup/", &json!({ "pidx": pidx })).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, GatewayError> {
        if self.config.secret_key.is_empty() {
            return Err(GatewayError::Config("Khalti secret key is not configured".to_string()));
        }

        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), path);
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Key {}", self.config.secret_key))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }
}

/// Pull a readable message out of a Khalti error body
fn error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => map
            .get("detail")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string()),
        _ => body.to_string(),
    }
}
