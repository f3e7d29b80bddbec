//! Domain events
use crate::domain::aggregates::OrderStatus;
use crate::domain::value_objects::Price;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data")]
pub enum DomainEvent {
    Order(OrderEvent),
}

impl DomainEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            DomainEvent::Order(OrderEvent::Placed { .. }) => "storefront.orders.placed",
            DomainEvent::Order(OrderEvent::StatusChanged { .. }) => "storefront.orders.status_changed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, user_id: Uuid, total: Price },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
}
