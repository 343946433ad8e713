pub mod aggregate;
pub mod errors;
pub mod events;
pub mod value_objects;

pub use aggregate::Order;
pub use errors::OrderError;
pub use events::{OrderCreatedEvent, OrderItemEvent};
pub use value_objects::{NewOrderItem, OrderItem, OrderStatus};
