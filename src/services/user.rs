//! User service
//!
//! Accounts, sessions and the admin user screens:
//! - registration (the first account becomes the store admin)
//! - login / logout and session validation
//! - profile and password changes
//! - admin list, update and delete

use crate::config::AuthConfig;
use crate::db::repositories::{OrderRepository, SessionRepository, UserRepository};
use crate::models::{
    AdminUpdateUserInput, ListQuery, PagedResult, Session, UpdateProfileInput, User, UserRole,
};
use crate::services::notification::{Audience, NotificationEvent, NotificationHub};
use crate::services::password::{hash_password, password_problem, verify_password};
use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

static EMAIL_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.as_ref().is_some_and(|re| re.is_match(email))
}

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Invalid credentials or session
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Authenticated but not allowed (banned account)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Email already registered
    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("User not found: {0}")]
    NotFound(String),

    /// The change would break another record (user with orders, self-demotion)
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// A logged-in user and their new session
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub user: User,
    #[serde(rename = "token", serialize_with = "serialize_token")]
    pub session: Session,
}

fn serialize_token<S: serde::Serializer>(session: &Session, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&session.id)
}

/// Registration request body
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl RegisterInput {
    pub fn new(name: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: password.into(),
            phone: None,
        }
    }
}

/// Login request body
#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Password change request body
#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordInput {
    #[serde(alias = "currentPassword")]
    pub current_password: String,
    #[serde(alias = "newPassword")]
    pub new_password: String,
}

/// User service for accounts and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    order_repo: Arc<dyn OrderRepository>,
    notifications: NotificationHub,
    session_days: i64,
    min_password_length: usize,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        order_repo: Arc<dyn OrderRepository>,
        notifications: NotificationHub,
        auth: &AuthConfig,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            order_repo,
            notifications,
            session_days: auth.session_days,
            min_password_length: auth.min_password_length,
        }
    }

    /// Register a customer account and log it in.
    ///
    /// The very first account is made admin so a fresh install has someone
    /// who can reach the back office.
    pub async fn register(&self, input: RegisterInput) -> Result<AuthSession, UserServiceError> {
        let name = input.name.trim().to_string();
        let email = input.email.trim().to_lowercase();

        if name.is_empty() {
            return Err(UserServiceError::ValidationError("Name cannot be empty".to_string()));
        }
        if !is_valid_email(&email) {
            return Err(UserServiceError::ValidationError("Invalid email format".to_string()));
        }
        if let Some(problem) = password_problem(&input.password, self.min_password_length) {
            return Err(UserServiceError::ValidationError(problem));
        }

        if self.user_repo.get_by_email(&email).await?.is_some() {
            return Err(UserServiceError::UserExists(format!(
                "Email '{}' is already registered",
                email
            )));
        }

        let role = if self.user_repo.count().await? == 0 {
            UserRole::Admin
        } else {
            UserRole::Customer
        };

        let password_hash = hash_password(&input.password)?;
        let mut user = User::new(name, email, password_hash, role);
        user.phone = input.phone.filter(|p| !p.trim().is_empty());

        let user = self
            .user_repo
            .create(&user)
            .await
            .context("Failed to create user")?;
        info!(user_id = user.id, role = %user.role, "user registered");

        let session = self.create_session(user.id).await?;
        Ok(AuthSession { user, session })
    }

    /// Check credentials and open a session
    pub async fn login(&self, input: LoginInput) -> Result<AuthSession, UserServiceError> {
        let invalid =
            || UserServiceError::AuthenticationError("Invalid email or password".to_string());

        let user = self
            .user_repo
            .get_by_email(&input.email)
            .await?
            .ok_or_else(invalid)?;

        if !verify_password(&input.password, &user.password_hash)? {
            warn!(user_id = user.id, "login with wrong password");
            return Err(invalid());
        }

        if user.is_banned() {
            return Err(UserServiceError::Forbidden(
                "Your account has been suspended".to_string(),
            ));
        }

        let session = self.create_session(user.id).await?;
        info!(user_id = user.id, "user logged in");
        Ok(AuthSession { user, session })
    }

    /// Drop a session
    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.session_repo.delete(token).await?;
        Ok(())
    }

    /// The user behind a session token, or `None` for unknown or expired tokens.
    ///
    /// Expired sessions are deleted on sight.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self.session_repo.get_by_id(token).await? {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            let _ = self.session_repo.delete(token).await;
            return Ok(None);
        }

        Ok(self.user_repo.get_by_id(session.user_id).await?)
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i64) -> Result<User, UserServiceError> {
        self.user_repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| UserServiceError::NotFound(id.to_string()))
    }

    /// Update the caller's own profile fields
    pub async fn update_profile(
        &self,
        user_id: i64,
        input: UpdateProfileInput,
    ) -> Result<User, UserServiceError> {
        let mut user = self.get_by_id(user_id).await?;

        if let Some(name) = input.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(UserServiceError::ValidationError("Name cannot be empty".to_string()));
            }
            user.name = name;
        }
        if let Some(phone) = input.phone {
            user.phone = non_blank(phone);
        }
        if let Some(address) = input.address {
            user.address = non_blank(address);
        }
        if let Some(city) = input.city {
            user.city = non_blank(city);
        }
        if let Some(avatar) = input.avatar {
            user.avatar = non_blank(avatar);
        }

        let updated = self.user_repo.update(&user).await?;
        self.notifications.publish(
            NotificationEvent::ProfileUpdated,
            Audience::User(updated.id),
            json!({ "user": updated }),
        );
        Ok(updated)
    }

    /// Change password after checking the current one. Every other session of
    /// the user is ended.
    pub async fn change_password(
        &self,
        user_id: i64,
        current_token: &str,
        input: ChangePasswordInput,
    ) -> Result<(), UserServiceError> {
        let mut user = self.get_by_id(user_id).await?;

        if !verify_password(&input.current_password, &user.password_hash)? {
            return Err(UserServiceError::ValidationError(
                "Current password is incorrect".to_string(),
            ));
        }
        if let Some(problem) = password_problem(&input.new_password, self.min_password_length) {
            return Err(UserServiceError::ValidationError(problem));
        }

        user.password_hash = hash_password(&input.new_password)?;
        self.user_repo.update(&user).await?;

        let ended = self
            .session_repo
            .delete_by_user(user_id, Some(current_token))
            .await?;
        info!(user_id, ended_sessions = ended, "password changed");
        Ok(())
    }

    /// Admin list of users
    pub async fn list(&self, query: &ListQuery) -> Result<PagedResult<User>, UserServiceError> {
        let (users, total) = self.user_repo.list(query).await?;
        Ok(PagedResult::new(users, total, query))
    }

    /// Admin edit of any user. Admins may not demote or ban themselves.
    pub async fn admin_update(
        &self,
        actor: &User,
        id: i64,
        input: AdminUpdateUserInput,
    ) -> Result<User, UserServiceError> {
        let mut user = self.get_by_id(id).await?;

        if actor.id == id {
            if input.role.is_some_and(|r| r != UserRole::Admin) {
                return Err(UserServiceError::Conflict(
                    "You cannot remove your own admin role".to_string(),
                ));
            }
            if input.status.is_some_and(|s| s != user.status) {
                return Err(UserServiceError::Conflict(
                    "You cannot change your own account status".to_string(),
                ));
            }
        }

        if let Some(name) = input.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(UserServiceError::ValidationError("Name cannot be empty".to_string()));
            }
            user.name = name;
        }
        if let Some(email) = input.email {
            let email = email.trim().to_lowercase();
            if !is_valid_email(&email) {
                return Err(UserServiceError::ValidationError("Invalid email format".to_string()));
            }
            if email != user.email && self.user_repo.get_by_email(&email).await?.is_some() {
                return Err(UserServiceError::UserExists(format!(
                    "Email '{}' is already registered",
                    email
                )));
            }
            user.email = email;
        }
        if let Some(role) = input.role {
            user.role = role;
        }
        if let Some(status) = input.status {
            user.status = status;
        }
        if let Some(phone) = input.phone {
            user.phone = non_blank(phone);
        }
        if let Some(address) = input.address {
            user.address = non_blank(address);
        }
        if let Some(city) = input.city {
            user.city = non_blank(city);
        }

        let updated = self.user_repo.update(&user).await?;
        if updated.is_banned() {
            self.session_repo.delete_by_user(updated.id, None).await?;
        }
        info!(user_id = updated.id, actor_id = actor.id, "user updated by admin");
        Ok(updated)
    }

    /// Admin delete. Users with orders are kept for the order history.
    pub async fn delete(&self, actor: &User, id: i64) -> Result<(), UserServiceError> {
        if actor.id == id {
            return Err(UserServiceError::Conflict(
                "You cannot delete your own account".to_string(),
            ));
        }
        self.get_by_id(id).await?;

        let orders = self.order_repo.count_for_user(id).await?;
        if orders > 0 {
            return Err(UserServiceError::Conflict(format!(
                "User has {} order(s); ban the account instead",
                orders
            )));
        }

        self.user_repo.delete(id).await?;
        info!(user_id = id, actor_id = actor.id, "user deleted");
        Ok(())
    }

    /// Remove expired sessions; returns how many were deleted
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        Ok(self.session_repo.delete_expired().await?)
    }

    /// Total number of accounts
    pub async fn count(&self) -> Result<i64, UserServiceError> {
        Ok(self.user_repo.count().await?)
    }

    async fn create_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let session = Session::issue(user_id, self.session_days);
        Ok(self.session_repo.create(&session).await?)
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
