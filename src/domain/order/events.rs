use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::aggregate::Order;

// ============================================================================
// Order Domain Events
// ============================================================================

/// Event payload staged in the outbox when an order is created. Wire names
/// are camelCase; consumers in other services parse this shape.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedEvent {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub total_amount: f64,
    pub items: Vec<OrderItemEvent>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemEvent {
    pub product_id: Uuid,
    pub quantity: i32,
    pub price: f64,
}

impl OrderCreatedEvent {
    pub const EVENT_TYPE: &'static str = "OrderCreated";

    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id,
            customer_id: order.customer_id,
            total_amount: order.total_amount,
            items: order
                .items
                .iter()
                .map(|item| OrderItemEvent {
                    product_id: item.product_id,
                    quantity: item.quantity,
                    price: item.price,
                })
                .collect(),
        }
    }
}
