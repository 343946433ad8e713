use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::order::Order;

use super::message::OutboxMessage;

// ============================================================================
// Store Contracts
// ============================================================================
//
// The store handles are explicit dependencies injected at construction time
// so tests can substitute doubles for Postgres. The outbox table is the only
// shared mutable resource between the request flow and the relay; everything
// goes through these two seams.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store error: {0}")]
    Backend(String),
}

/// Write side used by the request-handling flow.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert the order, all of its items and the outbox message in a single
    /// atomic unit. Either everything is committed or nothing is: no order
    /// may ever exist without its matching outbox message, and vice versa.
    async fn persist_with_outbox(
        &self,
        order: &Order,
        message: &OutboxMessage,
    ) -> Result<(), PersistenceError>;
}

/// Read/update side used by the relay.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Fetch up to `limit` pending messages, oldest first.
    async fn fetch_pending(&self, limit: i64) -> Result<Vec<OutboxMessage>, PersistenceError>;

    /// Mark one message `Sent` and stamp its processed date. A no-op for
    /// messages that are already `Sent`.
    async fn mark_sent(
        &self,
        id: Uuid,
        processed_date: DateTime<Utc>,
    ) -> Result<(), PersistenceError>;
}
