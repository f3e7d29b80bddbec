//! Storage seams.
//!
//! The core only reads products, rules and favourites; carts and orders are
//! written by their services. Two backends: `memory` and `postgres`.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{Cart, DiscountRule, Order, OrderStatus, Product};
use crate::domain::services::catalog::{CatalogFilter, PageWindow, SortOrder};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored data is corrupt: {0}")]
    Corrupt(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Product>, StoreError>;

    /// Products matching `filter`, ordered by `sort`, restricted to `window`.
    async fn list(&self, filter: &CatalogFilter, sort: SortOrder, window: PageWindow) -> Result<Vec<Product>, StoreError>;

    /// Size of the full filtered set.
    async fn count(&self, filter: &CatalogFilter) -> Result<u64, StoreError>;

    /// One page and the size of the full filtered set. Backends that can read
    /// both from one snapshot override this.
    async fn page(&self, filter: &CatalogFilter, sort: SortOrder, window: PageWindow) -> Result<(Vec<Product>, u64), StoreError> {
        tokio::try_join!(self.list(filter, sort, window), self.count(filter))
    }
}

#[async_trait]
pub trait DiscountRuleStore: Send + Sync {
    /// Every rule, in storage order.
    async fn all(&self) -> Result<Vec<DiscountRule>, StoreError>;
}

#[async_trait]
pub trait FavouriteStore: Send + Sync {
    async fn favourites_of(&self, user_id: Uuid) -> Result<HashSet<Uuid>, StoreError>;

    /// Flips membership; returns whether the product is now a favourite.
    async fn toggle(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn load(&self, user_id: Uuid) -> Result<Option<Cart>, StoreError>;

    /// Stores `cart` if the stored cart is still `expected` (`None`: no cart
    /// stored yet). Returns false, storing nothing, when another write got
    /// there first.
    async fn replace(&self, expected: Option<&Cart>, cart: &Cart) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Stores the order together with all of its lines, or nothing.
    async fn insert(&self, order: &Order) -> Result<(), StoreError>;
    /// Inserts the order and empties the cart it was built from, as one step,
    /// provided the stored cart is still `cart`. Returns false, storing
    /// nothing, when the cart changed.
    async fn place_from_cart(&self, order: &Order, cart: &Cart) -> Result<bool, StoreError>;
    async fn get(&self, id: Uuid) -> Result<Option<Order>, StoreError>;
    /// Newest first.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Order>, StoreError>;
    /// Newest first.
    async fn list_all(&self) -> Result<Vec<Order>, StoreError>;
    async fn save_status(&self, id: Uuid, status: OrderStatus) -> Result<(), StoreError>;
}
