//! Domain services: stateless logic over the stores
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod discount;
pub mod orders;
