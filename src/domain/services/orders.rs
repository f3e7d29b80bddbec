//! Order tracking
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::aggregates::{Order, OrderError, OrderStatus};
use crate::publisher::EventPublisher;
use crate::store::OrderStore;
use crate::ShopError;

#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    publisher: Arc<dyn EventPublisher>,
}

impl OrderService {
    pub fn new(orders: Arc<dyn OrderStore>, publisher: Arc<dyn EventPublisher>) -> Self { Self { orders, publisher } }

    pub async fn orders_of(&self, user_id: Uuid) -> Result<Vec<Order>, ShopError> {
        Ok(self.orders.list_for_user(user_id).await?)
    }

    pub async fn all(&self) -> Result<Vec<Order>, ShopError> {
        Ok(self.orders.list_all().await?)
    }

    /// Admin transition. Setting the current status again is a no-op.
    pub async fn update_status(&self, order_id: Uuid, status: OrderStatus) -> Result<Order, ShopError> {
        let mut order = self.orders.get(order_id).await?.ok_or(OrderError::NotFound)?;
        order.update_status(status)?;

        let events = order.take_events();
        if events.is_empty() { return Ok(order); }

        self.orders.save_status(order_id, status).await?;
        for event in &events {
            self.publisher.publish(event).await;
        }
        tracing::info!(%order_id, status = status.as_str(), "order status updated");
        Ok(order)
    }
}
