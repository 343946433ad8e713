use chrono::{DateTime, Utc};
use uuid::Uuid;

// ============================================================================
// Outbox Message - the staging entity shared by both flows
// ============================================================================

/// Delivery status of an outbox message. A message moves `Pending -> Sent`
/// exactly once and never reverts; there is no failed state, a failed
/// attempt simply leaves the message `Pending` for the next poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,
    Sent,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "Pending",
            OutboxStatus::Sent => "Sent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Pending" => Some(OutboxStatus::Pending),
            "Sent" => Some(OutboxStatus::Sent),
            _ => None,
        }
    }
}

/// One staged event. The id doubles as the idempotency token attached to
/// every delivery attempt; the payload is opaque bytes once written.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub event_type: String,
    pub payload: Vec<u8>,
    pub occurred_on: DateTime<Utc>,
    pub processed_date: Option<DateTime<Utc>>,
    pub status: OutboxStatus,
}

impl OutboxMessage {
    pub fn new(
        aggregate_id: Uuid,
        aggregate_type: &str,
        event_type: &str,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type: event_type.to_string(),
            payload,
            occurred_on: Utc::now(),
            processed_date: None,
            status: OutboxStatus::Pending,
        }
    }
}
