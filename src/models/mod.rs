//! Data models
//!
//! This module contains the data structures used throughout the JerseyNexus backend:
//! - Database entities (User, Session, Category, Product, CartItem, Order, Review, Blog)
//! - API request types (`Create*Input`, `Update*Input`)
//! - List query and pagination types
//! - Money helpers (paisa ⇄ rupee strings)

mod blog;
mod cart;
mod category;
mod listing;
mod money;
mod order;
mod product;
mod review;
mod session;
mod user;

pub use blog::{derive_excerpt, Blog, CreateBlogInput, UpdateBlogInput};
pub use cart::{AddCartItemInput, Cart, CartItem, CartLine, MAX_LINE_QUANTITY};
pub use category::{Category, CreateCategoryInput, UpdateCategoryInput};
pub use listing::{
    ListParams, ListQuery, ListQueryError, PagedResult, SortOrder, DEFAULT_PAGE_SIZE,
    MAX_PAGE_SIZE,
};
pub use money::{format_rupees, parse_rupees};
pub use order::{
    CheckoutItemInput, NewOrder, NewOrderItem, Order, OrderItem, OrderStatus, PaymentMethod,
    PaymentStatus, PaymentUpdate, PlaceOrderInput, ShippingAddress,
};
pub use product::{
    is_known_size, normalize_size, CreateProductInput, Product, ProductImage,
    UpdateProductInput, KNOWN_SIZES,
};
pub use review::{
    average_rating, CreateReviewInput, Review, UpdateReviewInput, MAX_COMMENT_LEN, MAX_RATING,
    MIN_RATING,
};
pub use session::Session;
pub use user::{AdminUpdateUserInput, UpdateProfileInput, User, UserRole, UserStatus};
