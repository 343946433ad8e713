pub mod publisher;
pub mod redpanda;

pub use publisher::{DeliveryError, EventPublisher};
pub use redpanda::RedpandaPublisher;
