use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::OrderError;
use super::value_objects::{NewOrderItem, OrderItem, OrderStatus};

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub order_date: DateTime<Utc>,
    pub status: OrderStatus,
    /// Derived from the items at construction; never independently mutated.
    pub total_amount: f64,
    pub items: Vec<OrderItem>,
}

impl Order {
    pub const AGGREGATE_TYPE: &'static str = "Order";

    /// Construct a new order with fresh identifiers, a `Pending` status and
    /// a total derived from the items. Pure in-memory construction: nothing
    /// here touches the store.
    pub fn new(customer_id: Uuid, items: Vec<NewOrderItem>) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::EmptyItems);
        }
        for item in &items {
            if item.quantity <= 0 {
                return Err(OrderError::InvalidQuantity(item.quantity));
            }
            if item.price < 0.0 {
                return Err(OrderError::InvalidPrice(item.price));
            }
        }

        let items: Vec<OrderItem> = items
            .into_iter()
            .map(|item| OrderItem {
                id: Uuid::new_v4(),
                product_id: item.product_id,
                quantity: item.quantity,
                price: item.price,
            })
            .collect();

        let total_amount = items
            .iter()
            .map(|item| item.price * f64::from(item.quantity))
            .sum();

        Ok(Self {
            id: Uuid::new_v4(),
            customer_id,
            order_date: Utc::now(),
            status: OrderStatus::Pending,
            total_amount,
            items,
        })
    }
}
