//! DeviceHub Storefront
//!
//! Storefront core for a device retail and repair shop.
//!
//! ## Features
//! - Discount resolution (percentage off within a price band and date window)
//! - Catalog filtering, sorting and pagination
//! - Cart snapshots and checkout via WhatsApp
//! - Order tracking and favourites

pub mod config;
pub mod domain;
pub mod http;
pub mod publisher;
pub mod store;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub use domain::aggregates::{
    Brand, Cart, CartError, CartItem, Category, Condition, DiscountRule, Order, OrderError, OrderStatus, Product,
    Variant,
};
pub use domain::services::catalog::{CatalogPage, CatalogService, ProductSummary, SearchCriteria, SortOrder};
pub use domain::services::discount::{resolve_discount, Countdown, DiscountQuote};
pub use domain::value_objects::{HexColor, Percent, Price, Quantity};
pub use store::StoreError;

// =============================================================================
// Core Types
// =============================================================================

/// Source of "now". Injected everywhere a decision depends on the time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> { Utc::now() }
}

#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> { self.0 }
}

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("invalid search criteria: {0}")]
    InvalidCriteria(String),

    #[error("product not found")]
    NotFound,

    #[error("product {product_id} cannot be listed: {reason}")]
    RecordMapping { product_id: Uuid, reason: &'static str },

    #[error("catalog unavailable: {0}")]
    DataUnavailable(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum ShopError {
    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("store unavailable: {0}")]
    DataUnavailable(#[from] StoreError),
}
