//! Order Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use crate::domain::value_objects::{HexColor, Price, Quantity};
use crate::domain::events::{DomainEvent, OrderEvent};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus { #[default] Pending, Shipped, Delivered, Completed, Cancelled }

impl OrderStatus {
    pub fn is_terminal(&self) -> bool { matches!(self, Self::Completed | Self::Cancelled) }
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending", Self::Shipped => "Shipped", Self::Delivered => "Delivered",
            Self::Completed => "Completed", Self::Cancelled => "Cancelled",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Pending, Self::Shipped, Self::Delivered, Self::Completed, Self::Cancelled]
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| OrderError::UnknownStatus(s.to_string()))
    }
}

/// Variant details frozen at checkout time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariantSnapshot {
    pub variant_id: Uuid,
    pub name: String,
    pub color: HexColor,
    pub storage: String,
    pub unit_price: Price,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderProduct {
    pub id: Uuid,
    pub product_id: Uuid,
    pub title: String,
    pub variant: VariantSnapshot,
    pub quantity: Quantity,
}

impl OrderProduct {
    pub fn line_total(&self) -> Price { self.variant.unit_price.multiply(self.quantity) }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    id: Uuid,
    user_id: Uuid,
    quantity: Quantity,
    total_price: Price,
    status: OrderStatus,
    lines: Vec<OrderProduct>,
    created_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl Order {
    /// Builds a pending order from its lines, dropping zero-quantity ones.
    /// Quantity and total are derived from the lines, never supplied.
    pub fn place(user_id: Uuid, lines: Vec<OrderProduct>, now: DateTime<Utc>) -> Result<Self, OrderError> {
        let lines: Vec<OrderProduct> = lines.into_iter().filter(|l| !l.quantity.is_zero()).collect();
        if lines.is_empty() { return Err(OrderError::NoItems); }
        let quantity = lines.iter().fold(Quantity::default(), |acc, l| acc.add(l.quantity));
        let total_price = lines.iter().fold(Price::ZERO, |acc, l| acc.add(l.line_total())).rounded();
        let id = Uuid::now_v7();
        let mut order = Self { id, user_id, quantity, total_price, status: OrderStatus::Pending, lines, created_at: now, events: vec![] };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed { order_id: id, user_id, total: total_price }));
        Ok(order)
    }

    /// Rebuilds a stored order; raises no events.
    pub fn restore(
        id: Uuid, user_id: Uuid, status: OrderStatus, lines: Vec<OrderProduct>,
        quantity: Quantity, total_price: Price, created_at: DateTime<Utc>,
    ) -> Self {
        Self { id, user_id, quantity, total_price, status, lines, created_at, events: vec![] }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn user_id(&self) -> Uuid { self.user_id }
    pub fn quantity(&self) -> Quantity { self.quantity }
    pub fn total_price(&self) -> Price { self.total_price }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn lines(&self) -> &[OrderProduct] { &self.lines }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

    /// Admin status change. Completed and cancelled orders are frozen.
    pub fn update_status(&mut self, status: OrderStatus) -> Result<(), OrderError> {
        if self.status.is_terminal() && self.status != status { return Err(OrderError::Terminal(self.status)); }
        if self.status == status { return Ok(()); }
        let from = self.status;
        self.status = status;
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id, from, to: status }));
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("order has no items")]
    NoItems,
    #[error("order is {} and can no longer change", .0.as_str())]
    Terminal(OrderStatus),
    #[error("unknown order status {0}")]
    UnknownStatus(String),
    #[error("order not found")]
    NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn line(price: u32, qty: u32) -> OrderProduct {
        OrderProduct {
            id: Uuid::new_v4(), product_id: Uuid::new_v4(), title: "Galaxy S24".into(),
            variant: VariantSnapshot {
                variant_id: Uuid::new_v4(), name: "Onyx".into(), color: HexColor::new("#111").unwrap(),
                storage: "256GB".into(), unit_price: Price::units(price),
            },
            quantity: Quantity::new(qty),
        }
    }

    #[test]
    fn test_order_totals_from_lines() {
        let mut order = Order::place(Uuid::new_v4(), vec![line(100, 2), line(50, 1)], Utc::now()).unwrap();
        assert_eq!(order.quantity().value(), 3);
        assert_eq!(order.total_price().amount(), Decimal::new(250, 0));
        assert_eq!(order.status(), OrderStatus::Pending);
        let events = order.take_events();
        assert!(matches!(events.as_slice(), [DomainEvent::Order(OrderEvent::Placed { .. })]));
    }

    #[test]
    fn test_empty_order_rejected() {
        assert_eq!(Order::place(Uuid::new_v4(), vec![], Utc::now()).unwrap_err(), OrderError::NoItems);
    }

    #[test]
    fn test_order_workflow() {
        let mut order = Order::place(Uuid::new_v4(), vec![line(10, 1)], Utc::now()).unwrap();
        order.take_events();
        order.update_status(OrderStatus::Shipped).unwrap();
        order.update_status(OrderStatus::Delivered).unwrap();
        order.update_status(OrderStatus::Completed).unwrap();
        assert_eq!(order.take_events().len(), 3);
        assert_eq!(order.update_status(OrderStatus::Pending), Err(OrderError::Terminal(OrderStatus::Completed)));
    }

    #[test]
    fn test_cancelled_is_terminal() {
        let mut order = Order::place(Uuid::new_v4(), vec![line(10, 1)], Utc::now()).unwrap();
        order.update_status(OrderStatus::Cancelled).unwrap();
        assert!(order.update_status(OrderStatus::Shipped).is_err());
        assert!(order.update_status(OrderStatus::Cancelled).is_ok());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("shipped".parse::<OrderStatus>().unwrap(), OrderStatus::Shipped);
        assert!("lost".parse::<OrderStatus>().is_err());
    }
}
