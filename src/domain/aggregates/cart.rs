//! Cart Aggregate
//!
//! A cart is an immutable snapshot. Every change returns a new cart; the
//! owner decides whether to store it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use crate::domain::value_objects::{HexColor, Price, Quantity};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub option_id: Uuid,
    pub title: String,
    pub variant_name: String,
    pub color: HexColor,
    pub storage: String,
    pub quantity: Quantity,
    /// Price after any discount active when the item was added.
    pub unit_price: Price,
}

impl CartItem {
    pub fn line_total(&self) -> Price { self.unit_price.multiply(self.quantity) }
    fn same_line(&self, other: &CartItem) -> bool {
        self.product_id == other.product_id && self.variant_id == other.variant_id && self.option_id == other.option_id
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    user_id: Uuid,
    items: Vec<CartItem>,
    updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn empty(user_id: Uuid) -> Self { Self { user_id, items: vec![], updated_at: Utc::now() } }

    pub fn user_id(&self) -> Uuid { self.user_id }
    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub fn subtotal(&self) -> Price {
        self.items.iter().fold(Price::ZERO, |acc, i| acc.add(i.line_total())).rounded()
    }

    /// Adds an item, merging quantities with an existing identical line.
    pub fn with_item(&self, item: CartItem) -> Result<Cart, CartError> {
        if item.quantity.is_zero() { return Err(CartError::ZeroQuantity); }
        let mut items = self.items.clone();
        match items.iter_mut().find(|i| i.same_line(&item)) {
            Some(existing) => existing.quantity = existing.quantity.add(item.quantity),
            None => items.push(item),
        }
        Ok(self.replaced(items))
    }

    /// Sets the quantity of the line for `option_id`; zero removes it.
    pub fn with_quantity(&self, option_id: Uuid, quantity: Quantity) -> Result<Cart, CartError> {
        if !self.items.iter().any(|i| i.option_id == option_id) { return Err(CartError::ItemNotFound); }
        let items = self.items.iter()
            .filter(|i| !(i.option_id == option_id && quantity.is_zero()))
            .map(|i| if i.option_id == option_id { CartItem { quantity, ..i.clone() } } else { i.clone() })
            .collect();
        Ok(self.replaced(items))
    }

    pub fn without_item(&self, option_id: Uuid) -> Result<Cart, CartError> {
        self.with_quantity(option_id, Quantity::default())
    }

    pub fn cleared(&self) -> Cart { self.replaced(vec![]) }

    fn replaced(&self, items: Vec<CartItem>) -> Cart {
        Cart { user_id: self.user_id, items, updated_at: Utc::now() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("item not found in cart")]
    ItemNotFound,
    #[error("quantity must be at least 1")]
    ZeroQuantity,
    #[error("cart is empty")]
    Empty,
    #[error("product or storage option no longer exists")]
    UnknownProduct,
    #[error("cart kept changing while being updated, try again")]
    Conflict,
}
