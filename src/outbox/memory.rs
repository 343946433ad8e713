use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::order::Order;

use super::message::{OutboxMessage, OutboxStatus};
use super::store::{OrderStore, OutboxStore, PersistenceError};

// ============================================================================
// In-Memory Store
// ============================================================================
//
// Drop-in double for the Postgres store, with fail-points for exercising the
// failure paths the outbox pattern exists to handle: a write failing halfway
// through the atomic unit, and the status update failing after a successful
// publish.
//
// ============================================================================

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    orders: HashMap<Uuid, Order>,
    outbox: Vec<OutboxMessage>,
    fail_order_insert: bool,
    fail_outbox_insert: bool,
    fail_mark_sent: bool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Poisoning only happens if a holder panicked; tests want that loud.
        self.inner.lock().expect("in-memory store mutex poisoned")
    }

    /// Make the order insert fail, before anything is written.
    pub fn fail_order_insert(&self, fail: bool) {
        self.lock().fail_order_insert = fail;
    }

    /// Make the outbox insert fail, after the order insert "succeeded"
    /// inside the unit. The unit must still leave no trace.
    pub fn fail_outbox_insert(&self, fail: bool) {
        self.lock().fail_outbox_insert = fail;
    }

    /// Make `mark_sent` fail, simulating a store failure between a
    /// successful publish and the status update.
    pub fn fail_mark_sent(&self, fail: bool) {
        self.lock().fail_mark_sent = fail;
    }

    pub fn order_count(&self) -> usize {
        self.lock().orders.len()
    }

    pub fn message(&self, id: Uuid) -> Option<OutboxMessage> {
        self.lock().outbox.iter().find(|m| m.id == id).cloned()
    }

    pub fn messages_for(&self, aggregate_id: Uuid) -> Vec<OutboxMessage> {
        self.lock()
            .outbox
            .iter()
            .filter(|m| m.aggregate_id == aggregate_id)
            .cloned()
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.lock()
            .outbox
            .iter()
            .filter(|m| m.status == OutboxStatus::Pending)
            .count()
    }

    /// Seed a message directly, bypassing the atomic unit. Relay tests use
    /// this to stage batches with controlled timestamps.
    pub fn insert_message(&self, message: OutboxMessage) {
        self.lock().outbox.push(message);
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn persist_with_outbox(
        &self,
        order: &Order,
        message: &OutboxMessage,
    ) -> Result<(), PersistenceError> {
        let mut inner = self.lock();

        if inner.fail_order_insert {
            return Err(PersistenceError::Backend(
                "injected order insert failure".to_string(),
            ));
        }
        if inner.fail_outbox_insert {
            return Err(PersistenceError::Backend(
                "injected outbox insert failure".to_string(),
            ));
        }

        // Mutations happen only after every fail-point passed, mirroring the
        // commit-at-the-end semantics of the Postgres transaction.
        inner.orders.insert(order.id, order.clone());
        inner.outbox.push(message.clone());
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for InMemoryStore {
    async fn fetch_pending(&self, limit: i64) -> Result<Vec<OutboxMessage>, PersistenceError> {
        let inner = self.lock();
        let mut pending: Vec<OutboxMessage> = inner
            .outbox
            .iter()
            .filter(|m| m.status == OutboxStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|m| m.occurred_on);
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn mark_sent(
        &self,
        id: Uuid,
        processed_date: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        let mut inner = self.lock();

        if inner.fail_mark_sent {
            return Err(PersistenceError::Backend(
                "injected status update failure".to_string(),
            ));
        }

        // Same guard as the SQL update: only a Pending message transitions.
        if let Some(message) = inner
            .outbox
            .iter_mut()
            .find(|m| m.id == id && m.status == OutboxStatus::Pending)
        {
            message.status = OutboxStatus::Sent;
            message.processed_date = Some(processed_date);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_count_tracks_status() {
        let store = InMemoryStore::new();
        store.insert_message(OutboxMessage::new(
            Uuid::new_v4(),
            "Order",
            "OrderCreated",
            vec![],
        ));
        assert_eq!(store.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_pending_orders_by_occurred_on() {
        let store = InMemoryStore::new();
        let base = Utc::now();

        let mut newer = OutboxMessage::new(Uuid::new_v4(), "Order", "OrderCreated", vec![]);
        newer.occurred_on = base + chrono::Duration::seconds(10);
        let mut older = OutboxMessage::new(Uuid::new_v4(), "Order", "OrderCreated", vec![]);
        older.occurred_on = base;

        store.insert_message(newer.clone());
        store.insert_message(older.clone());

        let fetched = store.fetch_pending(100).await.unwrap();
        assert_eq!(fetched[0].id, older.id);
        assert_eq!(fetched[1].id, newer.id);
    }

    #[tokio::test]
    async fn test_mark_sent_is_one_way() {
        let store = InMemoryStore::new();
        let msg = OutboxMessage::new(Uuid::new_v4(), "Order", "OrderCreated", vec![]);
        store.insert_message(msg.clone());

        let first = Utc::now();
        store.mark_sent(msg.id, first).await.unwrap();
        store
            .mark_sent(msg.id, first + chrono::Duration::seconds(60))
            .await
            .unwrap();

        let stored = store.message(msg.id).unwrap();
        assert_eq!(stored.status, OutboxStatus::Sent);
        assert_eq!(stored.processed_date, Some(first));
    }
}
