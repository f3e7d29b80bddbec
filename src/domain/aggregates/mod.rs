//! Aggregates module
pub mod product;
pub mod discount;
pub mod order;
pub mod cart;

pub use product::{Brand, Category, Condition, Product, StorageOption, UnknownValue, Variant};
pub use discount::{DiscountRule, DiscountRuleError};
pub use order::{Order, OrderError, OrderProduct, OrderStatus, VariantSnapshot};
pub use cart::{Cart, CartError, CartItem};
