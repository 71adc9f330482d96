//! eSewa ePay v2
//!
//! The browser posts a signed form straight to eSewa; eSewa redirects back
//! with a base64 JSON `data` parameter that carries its own signature.
//!
//! Signatures are BASE64(HMAC-SHA256(secret, message)) where the message is
//! `name=value` pairs for the `signed_field_names`, joined with commas, in
//! the order the names are listed.

use super::GatewayError;
use crate::config::EsewaConfig;
use crate::models::{format_rupees, parse_rupees, Order};
use chrono::{DateTime, Utc};
use data_encoding::BASE64;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;
use tracing::{debug, instrument, warn};

type HmacSha256 = Hmac<Sha256>;

/// Fields signed in the outgoing form, in signing order
pub const FORM_SIGNED_FIELDS: &str = "total_amount,transaction_uuid,product_code";

/// Callback status for a completed payment
pub const STATUS_COMPLETE: &str = "COMPLETE";

/// Form fields the storefront posts to eSewa
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EsewaForm {
    pub amount: String,
    pub tax_amount: String,
    pub total_amount: String,
    pub transaction_uuid: String,
    pub product_code: String,
    pub product_service_charge: String,
    pub product_delivery_charge: String,
    pub success_url: String,
    pub failure_url: String,
    pub signed_field_names: String,
    pub signature: String,
}

/// Everything the storefront needs to redirect to eSewa
#[derive(Debug, Clone, Serialize)]
pub struct EsewaInitiation {
    /// URL the form is posted to
    pub form_url: String,
    pub fields: EsewaForm,
}

/// Decoded and signature-checked eSewa callback
#[derive(Debug, Clone, PartialEq)]
pub struct EsewaCallback {
    pub transaction_code: Option<String>,
    pub status: String,
    /// Amount eSewa reports, in paisa
    pub total_amount: Option<i64>,
    pub transaction_uuid: String,
    pub product_code: String,
}

impl EsewaCallback {
    pub fn is_complete(&self) -> bool {
        self.status.eq_ignore_ascii_case(STATUS_COMPLETE)
    }
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    ref_id: Option<String>,
}

/// Result of the eSewa status API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsewaStatus {
    pub status: String,
    pub ref_id: Option<String>,
}

/// eSewa client for one merchant
#[derive(Debug, Clone)]
pub struct EsewaGateway {
    config: EsewaConfig,
    client: reqwest::Client,
}

impl EsewaGateway {
    pub fn new(config: EsewaConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &EsewaConfig {
        &self.config
    }

    /// BASE64(HMAC-SHA256(secret, message))
    pub fn sign(&self, message: &str) -> Result<String, GatewayError> {
        sign_message(&self.config.secret_key, message)
    }

    /// Transaction id for one payment attempt of an order
    pub fn transaction_uuid(order_id: i64, at: DateTime<Utc>) -> String {
        format!("JN-{}-{}", order_id, at.format("%y%m%d%H%M%S"))
    }

    /// Build the signed form for an order.
    ///
    /// Shipping is sent as the delivery charge so the parts add up to
    /// `total_amount`.
    pub fn initiate(&self, order: &Order) -> Result<EsewaInitiation, GatewayError> {
        self.initiate_at(order, Utc::now())
    }

    fn initiate_at(&self, order: &Order, at: DateTime<Utc>) -> Result<EsewaInitiation, GatewayError> {
        let transaction_uuid = Self::transaction_uuid(order.id, at);
        let total_amount = format_rupees(order.total_amount);

        let message = signing_message(&[
            ("total_amount", total_amount.as_str()),
            ("transaction_uuid", transaction_uuid.as_str()),
            ("product_code", self.config.product_code.as_str()),
        ]);
        let signature = self.sign(&message)?;

        Ok(EsewaInitiation {
            form_url: self.config.form_url.clone(),
            fields: EsewaForm {
                amount: format_rupees(order.items_total),
                tax_amount: "0".to_string(),
                total_amount,
                transaction_uuid,
                product_code: self.config.product_code.clone(),
                product_service_charge: "0".to_string(),
                product_delivery_charge: format_rupees(order.shipping_fee),
                success_url: self.config.success_url.clone(),
                failure_url: self.config.failure_url.clone(),
                signed_field_names: FORM_SIGNED_FIELDS.to_string(),
                signature,
            },
        })
    }

    /// Decode the base64 `data` callback and check its signature.
    ///
    /// The signature is recomputed over the callback's own
    /// `signed_field_names` and compared in constant time. The payment
    /// status is returned as-is for the caller to reconcile.
    pub fn verify(&self, data: &str) -> Result<EsewaCallback, GatewayError> {
        // the value may arrive still percent-encoded, and '+' turns into
        // ' ' when it went through a query string
        let decoded = urlencoding::decode(data.trim())
            .map_err(|e| GatewayError::InvalidResponse(format!("callback is not UTF-8: {}", e)))?;
        let cleaned: String = decoded.replace(' ', "+");
        let raw = BASE64
            .decode(cleaned.as_bytes())
            .map_err(|e| GatewayError::InvalidResponse(format!("callback is not base64: {}", e)))?;
        let fields: Map<String, Value> = serde_json::from_slice(&raw)
            .map_err(|e| GatewayError::InvalidResponse(format!("callback is not JSON: {}", e)))?;

        let signed_names = field_text(&fields, "signed_field_names")
            .ok_or_else(|| GatewayError::InvalidResponse("missing signed_field_names".to_string()))?;
        let signature = field_text(&fields, "signature")
            .ok_or_else(|| GatewayError::InvalidResponse("missing signature".to_string()))?;

        let mut pairs: Vec<(String, String)> = Vec::new();
        for name in signed_names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let value = field_text(&fields, name).ok_or_else(|| {
                GatewayError::InvalidResponse(format!("signed field {} is missing", name))
            })?;
            pairs.push((name.to_string(), value));
        }
        let borrowed: Vec<(&str, &str)> = pairs
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let message = signing_message(&borrowed);

        let expected = BASE64
            .decode(signature.as_bytes())
            .map_err(|_| GatewayError::InvalidSignature)?;
        let mut mac = HmacSha256::new_from_slice(self.config.secret_key.as_bytes())
            .map_err(|_| GatewayError::Config("eSewa secret key is invalid".to_string()))?;
        mac.update(message.as_bytes());
        if mac.verify_slice(&expected).is_err() {
            warn!("eSewa callback signature mismatch");
            return Err(GatewayError::InvalidSignature);
        }

        let callback = EsewaCallback {
            transaction_code: field_text(&fields, "transaction_code"),
            status: field_text(&fields, "status").unwrap_or_default(),
            total_amount: field_text(&fields, "total_amount").and_then(|a| parse_rupees(&a)),
            transaction_uuid: field_text(&fields, "transaction_uuid").unwrap_or_default(),
            product_code: field_text(&fields, "product_code").unwrap_or_default(),
        };
        debug!(uuid = %callback.transaction_uuid, status = %callback.status, "eSewa callback verified");
        Ok(callback)
    }

    /// Ask eSewa for the state of a transaction
    #[instrument(skip(self))]
    pub async fn check_status(
        &self,
        transaction_uuid: &str,
        total_amount: i64,
    ) -> Result<EsewaStatus, GatewayError> {
        let total = format_rupees(total_amount);
        let response = self
            .client
            .get(&self.config.status_url)
            .query(&[
                ("product_code", self.config.product_code.as_str()),
                ("total_amount", total.as_str()),
                ("transaction_uuid", transaction_uuid),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: StatusResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        Ok(EsewaStatus {
            status: parsed.status,
            ref_id: parsed.ref_id,
        })
    }
}

/// BASE64(HMAC-SHA256(secret, message))
pub fn sign_message(secret: &str, message: &str) -> Result<String, GatewayError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| GatewayError::Config("eSewa secret key is invalid".to_string()))?;
    mac.update(message.as_bytes());
    Ok(BASE64.encode(&mac.finalize().into_bytes()))
}

/// `a=1,b=2` in the given order
pub fn signing_message(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join(",")
}

/// A callback field as the text eSewa signed
fn field_text(fields: &Map<String, Value>, name: &str) -> Option<String> {
    match fields.get(name)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
