use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::messaging::publisher::{DeliveryError, EventPublisher};

use super::message::OutboxMessage;
use super::store::{OutboxStore, PersistenceError};

// ============================================================================
// Outbox Relay - polls pending messages and publishes them
// ============================================================================
//
// Delivery is at-least-once: a failed publish or a failed status update
// leaves the message Pending, and a later cycle retries it with the same
// message id as idempotency token. Retry is purely re-selection; there is no
// retry counter and no failed state. Nothing in here is fatal.
//
// The fetch does not claim rows, so a second relay instance running against
// the same table can attempt duplicate concurrent deliveries. This service
// assumes a single relay instance.
//
// ============================================================================

/// Upper bound on messages handled per cycle.
pub const BATCH_SIZE: i64 = 100;

const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

pub struct OutboxRelay {
    store: Arc<dyn OutboxStore>,
    publisher: Arc<dyn EventPublisher>,
    poll_interval: Duration,
    publish_timeout: Duration,
}

/// Outcome of one relay cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    pub fetched: usize,
    pub sent: usize,
    pub publish_failures: usize,
    pub update_failures: usize,
}

impl OutboxRelay {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        publisher: Arc<dyn EventPublisher>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            publisher,
            poll_interval,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    /// Run until the shutdown signal fires. Shutdown is observed between
    /// cycles only, so a cycle in flight always completes and in-flight
    /// publish attempts finish or time out first.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_cycle().await {
                        Ok(stats) if stats.fetched > 0 => {
                            tracing::info!(
                                fetched = stats.fetched,
                                sent = stats.sent,
                                publish_failures = stats.publish_failures,
                                update_failures = stats.update_failures,
                                "Outbox relay cycle complete"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!(error = %e, "Outbox relay failed to fetch pending messages");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("Outbox relay shutting down");
                    break;
                }
            }
        }
    }

    /// One cycle: fetch a batch of pending messages and walk the per-message
    /// state machine. A single message failing never aborts the batch.
    pub async fn run_cycle(&self) -> Result<CycleStats, PersistenceError> {
        let batch = self.store.fetch_pending(BATCH_SIZE).await?;
        let mut stats = CycleStats {
            fetched: batch.len(),
            ..CycleStats::default()
        };
        if batch.is_empty() {
            return Ok(stats);
        }

        tracing::debug!(message_count = batch.len(), "Fetched pending outbox messages");

        for message in &batch {
            match self.publish_one(message).await {
                Ok(()) => match self.store.mark_sent(message.id, Utc::now()).await {
                    Ok(()) => {
                        stats.sent += 1;
                        tracing::info!(
                            message_id = %message.id,
                            event_type = %message.event_type,
                            "Outbox message sent"
                        );
                    }
                    Err(e) => {
                        stats.update_failures += 1;
                        tracing::error!(
                            error = %e,
                            message_id = %message.id,
                            "Published but failed to mark message Sent; it stays Pending and will be redelivered with the same message id"
                        );
                    }
                },
                Err(e) => {
                    stats.publish_failures += 1;
                    tracing::warn!(
                        error = %e,
                        message_id = %message.id,
                        event_type = %message.event_type,
                        "Failed to publish outbox message; it stays Pending for the next cycle"
                    );
                }
            }
        }

        Ok(stats)
    }

    async fn publish_one(&self, message: &OutboxMessage) -> Result<(), DeliveryError> {
        match tokio::time::timeout(
            self.publish_timeout,
            self.publisher
                .publish(&message.event_type, message.id, &message.payload),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(self.publish_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use uuid::Uuid;

    use crate::outbox::memory::InMemoryStore;
    use crate::outbox::message::OutboxStatus;

    use super::*;

    /// Publisher double: records every attempt, succeeds unless told to fail
    /// the next n attempts for a given message id.
    #[derive(Default)]
    struct StubPublisher {
        failures: Mutex<HashMap<Uuid, u32>>,
        attempts: Mutex<Vec<(String, Uuid)>>,
    }

    impl StubPublisher {
        fn fail_times(&self, id: Uuid, n: u32) {
            self.failures.lock().unwrap().insert(id, n);
        }

        fn attempts(&self) -> Vec<(String, Uuid)> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventPublisher for StubPublisher {
        async fn publish(
            &self,
            event_type: &str,
            message_id: Uuid,
            _payload: &[u8],
        ) -> Result<(), DeliveryError> {
            self.attempts
                .lock()
                .unwrap()
                .push((event_type.to_string(), message_id));

            if let Some(remaining) = self.failures.lock().unwrap().get_mut(&message_id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(DeliveryError::Publish("stub failure".to_string()));
                }
            }
            Ok(())
        }
    }

    struct SlowPublisher;

    #[async_trait]
    impl EventPublisher for SlowPublisher {
        async fn publish(
            &self,
            _event_type: &str,
            _message_id: Uuid,
            _payload: &[u8],
        ) -> Result<(), DeliveryError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    fn pending_message(store: &InMemoryStore) -> OutboxMessage {
        let msg = OutboxMessage::new(Uuid::new_v4(), "Order", "OrderCreated", b"{}".to_vec());
        store.insert_message(msg.clone());
        msg
    }

    fn relay(store: &Arc<InMemoryStore>, publisher: &Arc<StubPublisher>) -> OutboxRelay {
        OutboxRelay::new(
            store.clone(),
            publisher.clone(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_successful_publish_marks_message_sent() {
        let store = Arc::new(InMemoryStore::new());
        let publisher = Arc::new(StubPublisher::default());
        let msg = pending_message(&store);

        let stats = relay(&store, &publisher).run_cycle().await.unwrap();

        assert_eq!(stats.fetched, 1);
        assert_eq!(stats.sent, 1);
        let stored = store.message(msg.id).unwrap();
        assert_eq!(stored.status, OutboxStatus::Sent);
        assert!(stored.processed_date.is_some());
    }

    #[tokio::test]
    async fn test_empty_batch_does_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let publisher = Arc::new(StubPublisher::default());

        let stats = relay(&store, &publisher).run_cycle().await.unwrap();

        assert_eq!(stats, CycleStats::default());
        assert!(publisher.attempts().is_empty());
    }

    #[tokio::test]
    async fn test_failed_publish_leaves_message_pending_and_reoffers_it() {
        let store = Arc::new(InMemoryStore::new());
        let publisher = Arc::new(StubPublisher::default());
        let msg = pending_message(&store);
        publisher.fail_times(msg.id, u32::MAX);

        let relay = relay(&store, &publisher);
        let first = relay.run_cycle().await.unwrap();
        let second = relay.run_cycle().await.unwrap();

        assert_eq!(first.publish_failures, 1);
        assert_eq!(second.publish_failures, 1);
        let stored = store.message(msg.id).unwrap();
        assert_eq!(stored.status, OutboxStatus::Pending);
        assert!(stored.processed_date.is_none());
        // Both attempts carried the same idempotency token.
        assert_eq!(publisher.attempts().len(), 2);
        assert!(publisher.attempts().iter().all(|(_, id)| *id == msg.id));
    }

    #[tokio::test]
    async fn test_publish_recovers_on_a_later_cycle() {
        let store = Arc::new(InMemoryStore::new());
        let publisher = Arc::new(StubPublisher::default());
        let msg = pending_message(&store);
        publisher.fail_times(msg.id, 1);

        let relay = relay(&store, &publisher);
        relay.run_cycle().await.unwrap();
        assert_eq!(store.message(msg.id).unwrap().status, OutboxStatus::Pending);

        let stats = relay.run_cycle().await.unwrap();
        assert_eq!(stats.sent, 1);
        assert_eq!(store.message(msg.id).unwrap().status, OutboxStatus::Sent);
    }

    #[tokio::test]
    async fn test_status_update_failure_redelivers_with_same_token() {
        let store = Arc::new(InMemoryStore::new());
        let publisher = Arc::new(StubPublisher::default());
        let msg = pending_message(&store);

        store.fail_mark_sent(true);
        let relay = relay(&store, &publisher);
        let first = relay.run_cycle().await.unwrap();

        assert_eq!(first.update_failures, 1);
        assert_eq!(store.message(msg.id).unwrap().status, OutboxStatus::Pending);

        store.fail_mark_sent(false);
        let second = relay.run_cycle().await.unwrap();

        assert_eq!(second.sent, 1);
        assert_eq!(store.message(msg.id).unwrap().status, OutboxStatus::Sent);
        // Duplicate delivery, same message id both times.
        let attempts = publisher.attempts();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].1, msg.id);
        assert_eq!(attempts[1].1, msg.id);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_the_batch() {
        let store = Arc::new(InMemoryStore::new());
        let publisher = Arc::new(StubPublisher::default());
        let first = pending_message(&store);
        let second = pending_message(&store);
        let third = pending_message(&store);
        publisher.fail_times(second.id, u32::MAX);

        let stats = relay(&store, &publisher).run_cycle().await.unwrap();

        assert_eq!(stats.sent, 2);
        assert_eq!(stats.publish_failures, 1);
        assert_eq!(store.message(first.id).unwrap().status, OutboxStatus::Sent);
        assert_eq!(store.message(second.id).unwrap().status, OutboxStatus::Pending);
        assert_eq!(store.message(third.id).unwrap().status, OutboxStatus::Sent);
    }

    #[tokio::test]
    async fn test_cycle_caps_batch_and_delivers_oldest_first() {
        let store = Arc::new(InMemoryStore::new());
        let publisher = Arc::new(StubPublisher::default());
        let base = Utc::now();

        let mut ids = Vec::new();
        for i in 0..150i64 {
            let mut msg =
                OutboxMessage::new(Uuid::new_v4(), "Order", "OrderCreated", b"{}".to_vec());
            msg.occurred_on = base + chrono::Duration::seconds(i);
            ids.push(msg.id);
            store.insert_message(msg);
        }

        let stats = relay(&store, &publisher).run_cycle().await.unwrap();

        assert_eq!(stats.fetched, 100);
        assert_eq!(stats.sent, 100);
        let attempted: Vec<Uuid> = publisher.attempts().iter().map(|(_, id)| *id).collect();
        assert_eq!(attempted, ids[..100].to_vec());
        assert_eq!(store.pending_count(), 50);
    }

    #[tokio::test]
    async fn test_publish_timeout_counts_as_failed_attempt() {
        let store = Arc::new(InMemoryStore::new());
        let msg = pending_message(&store);

        let relay = OutboxRelay::new(
            store.clone(),
            Arc::new(SlowPublisher),
            Duration::from_secs(5),
        )
        .with_publish_timeout(Duration::from_millis(10));

        let stats = relay.run_cycle().await.unwrap();

        assert_eq!(stats.publish_failures, 1);
        assert_eq!(store.message(msg.id).unwrap().status, OutboxStatus::Pending);
    }

    #[tokio::test]
    async fn test_run_exits_on_shutdown_signal() {
        let store = Arc::new(InMemoryStore::new());
        let publisher = Arc::new(StubPublisher::default());
        let relay = relay(&store, &publisher);

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { relay.run(rx).await });

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("relay did not shut down")
            .unwrap();
    }
}
