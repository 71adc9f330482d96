//! Services layer - Business logic
//!
//! This module contains all business logic services for the JerseyNexus store.
//! Services are responsible for:
//! - Implementing business rules
//! - Coordinating between repositories and cache
//! - Handling validation and error cases

pub mod blog;
pub mod cart;
pub mod category;
pub mod notification;
pub mod order;
pub mod password;
pub mod payment;
pub mod product;
pub mod rate_limiter;
pub mod review;
pub mod user;

pub use blog::{BlogService, BlogServiceError};
pub use cart::{CartService, CartServiceError};
pub use category::{generate_slug, CategoryService, CategoryServiceError};
pub use notification::{Audience, Notification, NotificationEvent, NotificationHub};
pub use order::{OrderService, OrderServiceError};
pub use password::{hash_password, verify_password};
pub use payment::{GatewayError, PaymentService, PaymentServiceError};
pub use product::{ProductService, ProductServiceError};
pub use rate_limiter::LoginRateLimiter;
pub use review::{ReviewService, ReviewServiceError};
pub use user::{
    AuthSession, ChangePasswordInput, LoginInput, RegisterInput, UserService, UserServiceError,
};
