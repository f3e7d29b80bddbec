//! Product Aggregate
//!
//! A product owns ordered variants, each variant owns ordered storage options.
//! Order matters: the first variant's first option is the product's
//! representative price.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::value_objects::{HexColor, Price};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category { Phones, Laptops, #[default] Others }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Brand { Apple, Samsung, #[default] Others }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition { #[default] New, Used, Refurbished }

macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self { $(Self::$variant => $text),+ }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
        }

        impl FromStr for $ty {
            type Err = UnknownValue;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(if s.trim().eq_ignore_ascii_case($text) { return Ok(Self::$variant); })+
                Err(UnknownValue { kind: stringify!($ty), value: s.to_string() })
            }
        }
    };
}

text_enum!(Category { Phones => "Phones", Laptops => "Laptops", Others => "Others" });
text_enum!(Brand { Apple => "Apple", Samsung => "Samsung", Others => "Others" });
text_enum!(Condition { New => "New", Used => "Used", Refurbished => "Refurbished" });

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownValue { pub kind: &'static str, pub value: String }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StorageOption { pub id: Uuid, pub variant_id: Uuid, pub label: String, pub price: Price }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub color: HexColor,
    pub condition: Option<Condition>,
    pub images: Vec<String>,
    pub options: Vec<StorageOption>,
}

impl Variant {
    pub fn new(product_id: Uuid, name: impl Into<String>, color: HexColor) -> Self {
        Self { id: Uuid::new_v4(), product_id, name: name.into(), color, condition: None, images: vec![], options: vec![] }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self { self.condition = Some(condition); self }
    pub fn with_image(mut self, url: impl Into<String>) -> Self { self.images.push(url.into()); self }

    pub fn with_option(mut self, label: impl Into<String>, price: Price) -> Self {
        self.options.push(StorageOption { id: Uuid::new_v4(), variant_id: self.id, label: label.into(), price });
        self
    }

    pub fn option(&self, option_id: Uuid) -> Option<&StorageOption> { self.options.iter().find(|o| o.id == option_id) }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub brand: Option<Brand>,
    pub created_at: DateTime<Utc>,
    pub variants: Vec<Variant>,
}

impl Product {
    pub fn create(title: impl Into<String>, category: Category) -> Self {
        Self {
            id: Uuid::new_v4(), title: title.into(), description: String::new(), category,
            brand: None, created_at: Utc::now(), variants: vec![],
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self { self.description = description.into(); self }
    pub fn with_brand(mut self, brand: Brand) -> Self { self.brand = Some(brand); self }
    pub fn created(mut self, at: DateTime<Utc>) -> Self { self.created_at = at; self }

    /// Appends a variant, re-parenting it onto this product.
    pub fn with_variant(mut self, mut variant: Variant) -> Self {
        variant.product_id = self.id;
        self.variants.push(variant);
        self
    }

    pub fn variant(&self, variant_id: Uuid) -> Option<&Variant> { self.variants.iter().find(|v| v.id == variant_id) }

    /// Price shown on listings and used by price sorting: the first variant's
    /// first storage option. Not the minimum across options.
    pub fn representative_price(&self) -> Option<Price> {
        self.variants.first()?.options.first().map(|o| o.price)
    }

    pub fn option_prices(&self) -> impl Iterator<Item = Price> + '_ {
        self.variants.iter().flat_map(|v| v.options.iter().map(|o| o.price))
    }

    pub fn conditions(&self) -> impl Iterator<Item = Condition> + '_ {
        self.variants.iter().filter_map(|v| v.condition)
    }

    /// Case-insensitive substring match against title or description.
    pub fn mentions(&self, needle_lower: &str) -> bool {
        self.title.to_lowercase().contains(needle_lower) || self.description.to_lowercase().contains(needle_lower)
    }
}
