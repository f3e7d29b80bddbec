//! Checkout
//!
//! There is no payment step. Checking out records a pending order, empties
//! the cart and hands the customer a WhatsApp link that opens a chat with
//! the shop, prefilled with the order summary.
//!
//! The order insert and the cart clear happen in one store call, and only
//! if the cart is unchanged since it was read. A cart that changed in
//! between is read again, so two checkouts of one cart place one order.

use serde::Serialize;
use std::fmt::Write;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::aggregates::{Cart, CartError, Order, OrderProduct, VariantSnapshot};
use crate::publisher::EventPublisher;
use crate::store::{CartStore, OrderStore};
use crate::{Clock, ShopError};

const MAX_ATTEMPTS: usize = 5;

#[derive(Clone, Debug, Serialize)]
pub struct Checkout {
    pub order: Order,
    pub whatsapp_url: String,
}

#[derive(Clone)]
pub struct CheckoutService {
    carts: Arc<dyn CartStore>,
    orders: Arc<dyn OrderStore>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    whatsapp_number: String,
}

impl CheckoutService {
    pub fn new(
        carts: Arc<dyn CartStore>,
        orders: Arc<dyn OrderStore>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        whatsapp_number: impl Into<String>,
    ) -> Self {
        Self { carts, orders, publisher, clock, whatsapp_number: whatsapp_number.into() }
    }

    pub async fn checkout(&self, user_id: Uuid) -> Result<Checkout, ShopError> {
        for _ in 0..MAX_ATTEMPTS {
            let cart = match self.carts.load(user_id).await? {
                Some(cart) if !cart.is_empty() => cart,
                _ => return Err(CartError::Empty.into()),
            };
            let mut order = Order::place(user_id, order_lines(&cart), self.clock.now())?;
            if !self.orders.place_from_cart(&order, &cart).await? {
                tracing::debug!(%user_id, "cart changed during checkout, retrying");
                continue;
            }

            for event in order.take_events() {
                self.publisher.publish(&event).await;
            }

            tracing::info!(order_id = %order.id(), %user_id, total = %order.total_price(), "order placed");
            let whatsapp_url = whatsapp_link(&self.whatsapp_number, &order_message(&order));
            return Ok(Checkout { order, whatsapp_url });
        }
        Err(CartError::Conflict.into())
    }
}

fn order_lines(cart: &Cart) -> Vec<OrderProduct> {
    cart.items()
        .iter()
        .map(|item| OrderProduct {
            id: Uuid::new_v4(),
            product_id: item.product_id,
            title: item.title.clone(),
            variant: VariantSnapshot {
                variant_id: item.variant_id,
                name: item.variant_name.clone(),
                color: item.color.clone(),
                storage: item.storage.clone(),
                unit_price: item.unit_price,
            },
            quantity: item.quantity,
        })
        .collect()
}

fn order_message(order: &Order) -> String {
    let mut msg = format!("Hello! I'd like to place order {}:\n", order.id());
    for line in order.lines() {
        let _ = writeln!(
            msg,
            "- {} x {} ({}, {}) @ {} = {}",
            line.quantity.value(),
            line.title,
            line.variant.name,
            line.variant.storage,
            line.variant.unit_price,
            line.line_total().rounded(),
        );
    }
    let _ = write!(msg, "Total: {}", order.total_price());
    msg
}

/// `wa.me` only accepts the number as bare digits.
pub fn whatsapp_link(number: &str, message: &str) -> String {
    let digits: String = number.chars().filter(char::is_ascii_digit).collect();
    format!("https://wa.me/{digits}?text={}", urlencoding::encode(message))
}
