//! Configuration management
//!
//! This module handles loading and parsing configuration for the JerseyNexus backend.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables prefixed with `JERSEYNEXUS_` (override file settings)
//!
//! Missing optional values are filled with sensible defaults, so the server
//! starts against the eSewa/Khalti sandboxes with no config file at all.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Upload configuration
    #[serde(default)]
    pub upload: UploadConfig,
    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Store (pricing/shipping) configuration
    #[serde(default)]
    pub store: StoreConfig,
    /// Payment gateway configuration
    #[serde(default)]
    pub payment: PaymentConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origins, comma separated (storefront and admin panel)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Public base URL of this API, used to build absolute upload URLs
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
            public_url: default_public_url(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_cors_origin() -> String {
    "http://localhost:5173,http://localhost:3000".to_string()
}

fn default_public_url() -> String {
    "http://localhost:5000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/jerseynexus.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache TTL in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// Maximum number of cached entries
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            max_capacity: default_max_capacity(),
        }
    }
}

fn default_ttl() -> u64 {
    600
}

fn default_max_capacity() -> u64 {
    10_000
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Upload directory path
    #[serde(default = "default_upload_path")]
    pub path: PathBuf,
    /// Maximum file size in bytes (default: 5MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Allowed image MIME types
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            path: default_upload_path(),
            max_file_size: default_max_file_size(),
            allowed_types: default_allowed_types(),
        }
    }
}

fn default_upload_path() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_max_file_size() -> u64 {
    5 * 1024 * 1024
}

fn default_allowed_types() -> Vec<String> {
    vec![
        "image/jpeg".to_string(),
        "image/png".to_string(),
        "image/gif".to_string(),
        "image/webp".to_string(),
    ]
}

impl UploadConfig {
    /// Check if a MIME type is allowed
    pub fn is_type_allowed(&self, mime_type: &str) -> bool {
        self.allowed_types.iter().any(|t| t == mime_type)
    }

    /// Get file extension for a MIME type
    pub fn get_extension(&self, mime_type: &str) -> &'static str {
        match mime_type {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            "image/svg+xml" => "svg",
            _ => "bin",
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Session lifetime in days
    #[serde(default = "default_session_days")]
    pub session_days: i64,
    /// Minimum accepted password length
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_days: default_session_days(),
            min_password_length: default_min_password_length(),
        }
    }
}

fn default_session_days() -> i64 {
    7
}

fn default_min_password_length() -> usize {
    6
}

/// Store configuration. Amounts are in paisa.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Display currency code
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Flat shipping fee per order
    #[serde(default = "default_shipping_fee")]
    pub shipping_fee: i64,
    /// Orders whose item total reaches this amount ship free (0 disables)
    #[serde(default = "default_free_shipping_threshold")]
    pub free_shipping_threshold: i64,
    /// Products at or below this stock level are reported on the dashboard
    #[serde(default = "default_low_stock_threshold")]
    pub low_stock_threshold: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            shipping_fee: default_shipping_fee(),
            free_shipping_threshold: default_free_shipping_threshold(),
            low_stock_threshold: default_low_stock_threshold(),
        }
    }
}

impl StoreConfig {
    /// Shipping fee charged for an order with the given item total
    pub fn shipping_for(&self, items_total: i64) -> i64 {
        if self.free_shipping_threshold > 0 && items_total >= self.free_shipping_threshold {
            0
        } else {
            self.shipping_fee
        }
    }
}

fn default_currency() -> String {
    "NPR".to_string()
}

fn default_shipping_fee() -> i64 {
    10_000
}

fn default_free_shipping_threshold() -> i64 {
    500_000
}

fn default_low_stock_threshold() -> i64 {
    5
}

/// Payment gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentConfig {
    /// eSewa ePay v2
    #[serde(default)]
    pub esewa: EsewaConfig,
    /// Khalti KPG-2
    #[serde(default)]
    pub khalti: KhaltiConfig,
}

/// eSewa merchant configuration. Defaults point at the eSewa UAT environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsewaConfig {
    /// Merchant product code
    #[serde(default = "default_esewa_product_code")]
    pub product_code: String,
    /// HMAC secret shared with eSewa
    #[serde(default = "default_esewa_secret_key")]
    pub secret_key: String,
    /// Form endpoint the browser posts to
    #[serde(default = "default_esewa_form_url")]
    pub form_url: String,
    /// Transaction status check endpoint
    #[serde(default = "default_esewa_status_url")]
    pub status_url: String,
    /// Storefront page eSewa redirects to on success
    #[serde(default = "default_esewa_success_url")]
    pub success_url: String,
    /// Storefront page eSewa redirects to on failure
    #[serde(default = "default_esewa_failure_url")]
    pub failure_url: String,
    /// Confirm callbacks against the status API before marking orders paid
    #[serde(default = "default_true")]
    pub verify_status: bool,
}

impl Default for EsewaConfig {
    fn default() -> Self {
        Self {
            product_code: default_esewa_product_code(),
            secret_key: default_esewa_secret_key(),
            form_url: default_esewa_form_url(),
            status_url: default_esewa_status_url(),
            success_url: default_esewa_success_url(),
            failure_url: default_esewa_failure_url(),
            verify_status: true,
        }
    }
}

fn default_esewa_product_code() -> String {
    "EPAYTEST".to_string()
}

fn default_esewa_secret_key() -> String {
    "8gBm/:&EnhH.1/q".to_string()
}

fn default_esewa_form_url() -> String {
    "https://rc-epay.esewa.com.np/api/epay/main/v2/form".to_string()
}

fn default_esewa_status_url() -> String {
    "https://rc.esewa.com.np/api/epay/transaction/status/".to_string()
}

fn default_esewa_success_url() -> String {
    "http://localhost:5173/esewa/success".to_string()
}

fn default_esewa_failure_url() -> String {
    "http://localhost:5173/esewa/failed".to_string()
}

fn default_true() -> bool {
    true
}

/// Khalti merchant configuration. Defaults point at the Khalti sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KhaltiConfig {
    /// Live or test secret key, sent as `Authorization: Key <secret>`
    #[serde(default)]
    pub secret_key: String,
    /// API base, without the `/epayment/...` suffix
    #[serde(default = "default_khalti_base_url")]
    pub base_url: String,
    /// Storefront page Khalti redirects to after payment
    #[serde(default = "default_khalti_return_url")]
    pub return_url: String,
    /// Storefront root URL
    #[serde(default = "default_khalti_website_url")]
    pub website_url: String,
}

impl Default for KhaltiConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            base_url: default_khalti_base_url(),
            return_url: default_khalti_return_url(),
            website_url: default_khalti_website_url(),
        }
    }
}

fn default_khalti_base_url() -> String {
    "https://dev.khalti.com/api/v2".to_string()
}

fn default_khalti_return_url() -> String {
    "http://localhost:5173/khalti/verify".to_string()
}

fn default_khalti_website_url() -> String {
    "http://localhost:5173".to_string()
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: format_yaml_error(&e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern `JERSEYNEXUS_<SECTION>_<KEY>`:
    /// - JERSEYNEXUS_SERVER_HOST, JERSEYNEXUS_SERVER_PORT, JERSEYNEXUS_SERVER_CORS_ORIGIN
    /// - JERSEYNEXUS_DATABASE_DRIVER, JERSEYNEXUS_DATABASE_URL
    /// - JERSEYNEXUS_CACHE_TTL_SECONDS
    /// - JERSEYNEXUS_ESEWA_PRODUCT_CODE, JERSEYNEXUS_ESEWA_SECRET_KEY
    /// - JERSEYNEXUS_KHALTI_SECRET_KEY, JERSEYNEXUS_KHALTI_BASE_URL
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.store.shipping_fee < 0 {
            return Err(ConfigError::ValidationError(
                "store.shipping_fee must not be negative".to_string(),
            ));
        }
        if self.auth.session_days <= 0 {
            return Err(ConfigError::ValidationError(
                "auth.session_days must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("JERSEYNEXUS_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("JERSEYNEXUS_SERVER_PORT") {
            match port.parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!("Ignoring invalid JERSEYNEXUS_SERVER_PORT: {}", port),
            }
        }
        if let Ok(cors_origin) = std::env::var("JERSEYNEXUS_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }
        if let Ok(public_url) = std::env::var("JERSEYNEXUS_SERVER_PUBLIC_URL") {
            self.server.public_url = public_url;
        }

        if let Ok(driver) = std::env::var("JERSEYNEXUS_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => tracing::warn!("Ignoring invalid JERSEYNEXUS_DATABASE_DRIVER: {}", driver),
            }
        }
        if let Ok(url) = std::env::var("JERSEYNEXUS_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(ttl) = std::env::var("JERSEYNEXUS_CACHE_TTL_SECONDS") {
            if let Ok(ttl) = ttl.parse::<u64>() {
                self.cache.ttl_seconds = ttl;
            }
        }

        if let Ok(code) = std::env::var("JERSEYNEXUS_ESEWA_PRODUCT_CODE") {
            self.payment.esewa.product_code = code;
        }
        if let Ok(secret) = std::env::var("JERSEYNEXUS_ESEWA_SECRET_KEY") {
            self.payment.esewa.secret_key = secret;
        }
        if let Ok(secret) = std::env::var("JERSEYNEXUS_KHALTI_SECRET_KEY") {
            self.payment.khalti.secret_key = secret;
        }
        if let Ok(base_url) = std::env::var("JERSEYNEXUS_KHALTI_BASE_URL") {
            self.payment.khalti.base_url = base_url;
        }
    }

    /// CORS origins as a list
    pub fn cors_origins(&self) -> Vec<String> {
        self.server
            .cors_origin
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for all config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_KEYS: &[&str] = &[
    "JERSEYNEXUS_SERVER_HOST",
    "JERSEYNEXUS_SERVER_PORT",
    "JERSEYNEXUS_SERVER_CORS_ORIGIN",
    "JERSEYNEXUS_SERVER_PUBLIC_URL",
    "JERSEYNEXUS_DATABASE_DRIVER",
    "JERSEYNEXUS_DATABASE_URL",
    "JERSEYNEXUS_CACHE_TTL_SECONDS",
    "JERSEYNEXUS_ESEWA_PRODUCT_CODE",
    "JERSEYNEXUS_ESEWA_SECRET_KEY",
    "JERSEYNEXUS_KHALTI_SECRET_KEY",
    "JERSEYNEXUS_KHALTI_BASE_URL",
];


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    proptest! {
        #[test]
        fn prop_config_yaml_roundtrip(
            port in 1u16..=65535,
            ttl in 1u64..=86400,
            shipping in 0i64..=1_000_000,
            driver in prop_oneof![Just(DatabaseDriver::Sqlite), Just(DatabaseDriver::Mysql)],
        ) {
            let mut config = Config::default();
            config.server.port = port;
            config.cache.ttl_seconds = ttl;
            config.store.shipping_fee = shipping;
            config.database.driver = driver;

            let yaml = serde_yaml::to_string(&config).unwrap();
            let mut file = NamedTempFile::new().unwrap();
            file.write_all(yaml.as_bytes()).unwrap();

            let loaded = Config::load(file.path()).unwrap();
            prop_assert_eq!(loaded.server.port, port);
            prop_assert_eq!(loaded.cache.ttl_seconds, ttl);
            prop_assert_eq!(loaded.store.shipping_fee, shipping);
            prop_assert_eq!(loaded.database.driver, driver);
        }

        #[test]
        fn prop_shipping_is_zero_or_flat(items_total in 0i64..=10_000_000) {
            let store = StoreConfig::default();
            let fee = store.shipping_for(items_total);
            prop_assert!(fee == 0 || fee == store.shipping_fee);
            prop_assert_eq!(fee == 0, items_total >= store.free_shipping_threshold);
        }
    }
}
