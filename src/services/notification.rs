//! Notification hub
//!
//! Fan-out of order, payment and profile events to connected WebSocket
//! clients. Built on a `tokio::sync::broadcast` channel: every socket holds a
//! receiver and filters events by audience. Receivers that fall behind skip
//! what they missed.

use crate::models::User;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tokio::sync::broadcast;
use tracing::debug;

/// Buffered events per receiver before it starts lagging
const CHANNEL_CAPACITY: usize = 256;

/// Kinds of event pushed to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NotificationEvent {
    #[serde(rename = "order.created")]
    OrderCreated,
    #[serde(rename = "order.updated")]
    OrderUpdated,
    #[serde(rename = "payment.updated")]
    PaymentUpdated,
    #[serde(rename = "profile.updated")]
    ProfileUpdated,
}

impl fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationEvent::OrderCreated => "order.created",
            NotificationEvent::OrderUpdated => "order.updated",
            NotificationEvent::PaymentUpdated => "payment.updated",
            NotificationEvent::ProfileUpdated => "profile.updated",
        };
        f.write_str(s)
    }
}

/// Who may receive an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// One user
    User(i64),
    /// Every administrator
    Admins,
    /// One user and every administrator
    UserAndAdmins(i64),
}

/// An event on its way to clients
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub event: NotificationEvent,
    #[serde(skip)]
    pub audience: Audience,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(event: NotificationEvent, audience: Audience, payload: Value) -> Self {
        Self {
            event,
            audience,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Whether `user` should receive this event
    pub fn is_visible_to(&self, user: &User) -> bool {
        match self.audience {
            Audience::User(id) => user.id == id,
            Audience::Admins => user.is_admin(),
            Audience::UserAndAdmins(id) => user.id == id || user.is_admin(),
        }
    }
}

/// Broadcast hub shared by services and WebSocket handlers
#[derive(Debug, Clone)]
pub struct NotificationHub {
    sender: broadcast::Sender<Notification>,
}

impl NotificationHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish an event. Returns how many sockets were listening.
    pub fn publish(&self, event: NotificationEvent, audience: Audience, payload: Value) -> usize {
        let notification = Notification::new(event, audience, payload);
        // send only fails when nobody is subscribed
        let delivered = self.sender.send(notification).unwrap_or(0);
        debug!(%event, ?audience, delivered, "notification published");
        delivered
    }

    /// Receiver for a newly connected socket
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Number of connected sockets
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use serde_json::json;

    fn user(id: i64, role: UserRole) -> User {
        let mut user = User::new(
            format!("User {}", id),
            format!("user{}@example.com", id),
            String::new(),
            role,
        );
        user.id = id;
        user
    }

    #[test]
    fn test_audience_visibility() {
        let customer = user(1, UserRole::Customer);
        let other = user(2, UserRole::Customer);
        let admin = user(3, UserRole::Admin);

        let own = Notification::new(NotificationEvent::ProfileUpdated, Audience::User(1), json!({}));
        assert!(own.is_visible_to(&customer));
        assert!(!own.is_visible_to(&other));
        assert!(!own.is_visible_to(&admin));

        let admins = Notification::new(NotificationEvent::OrderCreated, Audience::Admins, json!({}));
        assert!(!admins.is_visible_to(&customer));
        assert!(admins.is_visible_to(&admin));

        let both = Notification::new(
            NotificationEvent::PaymentUpdated,
            Audience::UserAndAdmins(1),
            json!({}),
        );
        assert!(both.is_visible_to(&customer));
        assert!(both.is_visible_to(&admin));
        assert!(!both.is_visible_to(&other));
    }

    #[test]
    fn test_serialized_shape() {
        let n = Notification::new(
            NotificationEvent::OrderUpdated,
            Audience::User(1),
            json!({"order_id": 7}),
        );
        let value = serde_json::to_value(&n).unwrap();
        assert_eq!(value["event"], "order.updated");
        assert_eq!(value["payload"]["order_id"], 7);
        assert!(value.get("timestamp").is_some());
        assert!(value.get("audience").is_none());
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let hub = NotificationHub::new();
        assert_eq!(
            hub.publish(NotificationEvent::OrderCreated, Audience::Admins, json!({})),
            0
        );

        let mut rx = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);
        hub.publish(
            NotificationEvent::PaymentUpdated,
            Audience::User(5),
            json!({"status": "paid"}),
        );

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event, NotificationEvent::PaymentUpdated);
        assert_eq!(received.audience, Audience::User(5));
    }
}
