use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use uuid::Uuid;

use super::publisher::{DeliveryError, EventPublisher};

// ============================================================================
// Redpanda / Kafka Publisher
// ============================================================================

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RedpandaPublisher {
    producer: FutureProducer,
}

impl RedpandaPublisher {
    pub fn new(brokers: &str) -> Result<Self, KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }
}

#[async_trait]
impl EventPublisher for RedpandaPublisher {
    /// Topic is the event type, the message key is the outbox message id so
    /// consumers can deduplicate redeliveries of the same logical event.
    async fn publish(
        &self,
        event_type: &str,
        message_id: Uuid,
        payload: &[u8],
    ) -> Result<(), DeliveryError> {
        let key = message_id.to_string();
        let record = FutureRecord::to(event_type)
            .key(&key)
            .payload(payload)
            .headers(OwnedHeaders::new().insert(Header {
                key: "content-type",
                value: Some("application/json"),
            }));

        self.producer
            .send(record, rdkafka::util::Timeout::After(SEND_TIMEOUT))
            .await
            .map_err(|(e, _)| DeliveryError::Publish(e.to_string()))?;

        tracing::info!(
            topic = %event_type,
            key = %key,
            "Published to Redpanda"
        );
        Ok(())
    }
}
