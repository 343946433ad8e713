use std::sync::Arc;

use uuid::Uuid;

use crate::domain::order::{NewOrderItem, Order, OrderCreatedEvent, OrderError};
use crate::outbox::{OrderStore, OutboxMessage, PersistenceError};

// ============================================================================
// Order Service - Persist-and-Stage
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CreateOrderError {
    /// Malformed input; the caller's fault, surfaced as a client error.
    #[error(transparent)]
    Validation(#[from] OrderError),

    #[error("failed to encode event payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

pub struct OrderService {
    store: Arc<dyn OrderStore>,
}

impl OrderService {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    /// Create an order and stage its `OrderCreated` event in one atomic
    /// unit. The unit brackets both writes exactly: the order (with items)
    /// and the outbox message either both commit or neither does. Splitting
    /// this into two units is the classic bug the outbox pattern prevents.
    pub async fn create_order(
        &self,
        customer_id: Uuid,
        items: Vec<NewOrderItem>,
    ) -> Result<Uuid, CreateOrderError> {
        let order = Order::new(customer_id, items)?;

        let event = OrderCreatedEvent::from_order(&order);
        let payload = serde_json::to_vec(&event)?;
        let message = OutboxMessage::new(
            order.id,
            Order::AGGREGATE_TYPE,
            OrderCreatedEvent::EVENT_TYPE,
            payload,
        );

        self.store.persist_with_outbox(&order, &message).await?;

        tracing::info!(
            order_id = %order.id,
            customer_id = %customer_id,
            message_id = %message.id,
            "Order persisted with outbox event"
        );
        Ok(order.id)
    }
}

#[cfg(test)]
mod tests {
    use crate::outbox::{InMemoryStore, OutboxStatus};

    use super::*;

    fn items() -> Vec<NewOrderItem> {
        vec![
            NewOrderItem {
                product_id: Uuid::new_v4(),
                quantity: 2,
                price: 10.0,
            },
            NewOrderItem {
                product_id: Uuid::new_v4(),
                quantity: 1,
                price: 5.0,
            },
        ]
    }

    #[tokio::test]
    async fn test_create_order_stages_exactly_one_pending_message() {
        let store = Arc::new(InMemoryStore::new());
        let service = OrderService::new(store.clone());

        let order_id = service
            .create_order(Uuid::new_v4(), items())
            .await
            .unwrap();

        let messages = store.messages_for(order_id);
        assert_eq!(messages.len(), 1);
        let msg = &messages[0];
        assert_eq!(msg.status, OutboxStatus::Pending);
        assert_eq!(msg.aggregate_type, "Order");
        assert_eq!(msg.event_type, "OrderCreated");
        assert_eq!(store.order_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_between_inserts_leaves_no_trace() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_outbox_insert(true);
        let service = OrderService::new(store.clone());

        let result = service.create_order(Uuid::new_v4(), items()).await;

        assert!(matches!(result, Err(CreateOrderError::Persistence(_))));
        assert_eq!(store.order_count(), 0);
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_order_insert_failure_leaves_no_trace() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_order_insert(true);
        let service = OrderService::new(store.clone());

        let result = service.create_order(Uuid::new_v4(), items()).await;

        assert!(matches!(result, Err(CreateOrderError::Persistence(_))));
        assert_eq!(store.order_count(), 0);
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_validation_failure_never_reaches_the_store() {
        let store = Arc::new(InMemoryStore::new());
        let service = OrderService::new(store.clone());

        let result = service.create_order(Uuid::new_v4(), vec![]).await;

        assert!(matches!(result, Err(CreateOrderError::Validation(_))));
        assert_eq!(store.order_count(), 0);
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_staged_payload_carries_the_event() {
        let store = Arc::new(InMemoryStore::new());
        let service = OrderService::new(store.clone());

        let order_id = service
            .create_order(Uuid::new_v4(), items())
            .await
            .unwrap();

        let msg = store.messages_for(order_id).remove(0);
        let json: serde_json::Value = serde_json::from_slice(&msg.payload).unwrap();
        assert_eq!(json["orderId"], order_id.to_string());
        assert_eq!(json["totalAmount"], 25.0);
        assert_eq!(json["items"].as_array().unwrap().len(), 2);
    }
}
