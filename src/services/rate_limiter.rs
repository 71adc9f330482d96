//! Rate limiter for login attempts
//!
//! Two sliding windows guard the login endpoint:
//! - failed attempts per email (5 per 15 minutes)
//! - requests per client IP (10 per minute)

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::net::IpAddr;
use tokio::sync::RwLock;

/// Timestamps of recent events per key, trimmed to a window
struct SlidingWindow<K> {
    limit: usize,
    window: Duration,
    events: RwLock<HashMap<K, Vec<DateTime<Utc>>>>,
}

impl<K: Eq + Hash> SlidingWindow<K> {
    fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            events: RwLock::new(HashMap::new()),
        }
    }

    async fn is_limited(&self, key: K) -> bool {
        let cutoff = Utc::now() - self.window;
        let mut events = self.events.write().await;
        let times = events.entry(key).or_default();
        times.retain(|t| *t > cutoff);
        times.len() >= self.limit
    }

    async fn record(&self, key: K) {
        self.events.write().await.entry(key).or_default().push(Utc::now());
    }

    async fn reset(&self, key: &K) {
        self.events.write().await.remove(key);
    }

    async fn cleanup(&self) {
        let cutoff = Utc::now() - self.window;
        self.events.write().await.retain(|_, times| {
            times.retain(|t| *t > cutoff);
            !times.is_empty()
        });
    }
}

/// Login rate limiter
pub struct LoginRateLimiter {
    by_email: SlidingWindow<String>,
    by_ip: SlidingWindow<IpAddr>,
}

impl LoginRateLimiter {
    /// Create a limiter with the default windows
    pub fn new() -> Self {
        Self::with_limits(5, Duration::minutes(15), 10, Duration::minutes(1))
    }

    /// Create a limiter with custom limits
    pub fn with_limits(
        email_limit: usize,
        email_window: Duration,
        ip_limit: usize,
        ip_window: Duration,
    ) -> Self {
        Self {
            by_email: SlidingWindow::new(email_limit, email_window),
            by_ip: SlidingWindow::new(ip_limit, ip_window),
        }
    }

    /// Too many recent failures for this email (case-insensitive)
    pub async fn is_email_limited(&self, email: &str) -> bool {
        self.by_email.is_limited(normalize(email)).await
    }

    /// Record a failed login for this email
    pub async fn record_failed_attempt(&self, email: &str) {
        self.by_email.record(normalize(email)).await;
    }

    /// Forget failures after a successful login
    pub async fn clear_email_attempts(&self, email: &str) {
        self.by_email.reset(&normalize(email)).await;
    }

    /// Too many recent requests from this IP
    pub async fn is_ip_limited(&self, ip: IpAddr) -> bool {
        self.by_ip.is_limited(ip).await
    }

    /// Record a login request from this IP
    pub async fn record_ip_request(&self, ip: IpAddr) {
        self.by_ip.record(ip).await;
    }

    /// Drop expired entries; run periodically
    pub async fn cleanup(&self) {
        self.by_email.cleanup().await;
        self.by_ip.cleanup().await;
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}
