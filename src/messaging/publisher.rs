use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

// ============================================================================
// Event Publisher Contract
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("publish failed: {0}")]
    Publish(String),

    #[error("publish timed out after {0:?}")]
    Timeout(Duration),
}

/// Seam to the message bus. The relay never sees the concrete producer, so
/// tests substitute scripted doubles.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one event. `event_type` is the routing classifier and
    /// `message_id` the idempotency token consumers use to recognize
    /// duplicate deliveries of the same logical event.
    async fn publish(
        &self,
        event_type: &str,
        message_id: Uuid,
        payload: &[u8],
    ) -> Result<(), DeliveryError>;
}
