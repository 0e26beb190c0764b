use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use serde::{Deserialize, Serialize};

use crate::metrics::Metrics;

// ============================================================================
// Dead Letter Queue
// ============================================================================
//
// Messages that keep failing dispatch, and payloads that cannot be decoded
// at all, are diverted to a side topic instead of blocking their partition
// forever. The letter wraps the raw payload with enough provenance for
// manual inspection and replay.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub key: String,
    /// Original message payload, lossily decoded as UTF-8
    pub payload: String,
    pub source_topic: String,
    pub partition: i32,
    pub offset: i64,
    pub error_message: String,
    pub failure_count: u32,
    pub first_failed_at: DateTime<Utc>,
    pub last_failed_at: DateTime<Utc>,
}

pub struct DeadLetterQueue {
    producer: FutureProducer,
    topic: String,
    send_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl DeadLetterQueue {
    pub fn new(
        brokers: &str,
        topic: String,
        send_timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> anyhow::Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", &send_timeout.as_millis().to_string())
            .create()?;

        Ok(Self {
            producer,
            topic,
            send_timeout,
            metrics,
        })
    }

    pub async fn divert(&self, letter: &DeadLetter) -> anyhow::Result<()> {
        tracing::error!(
            source_topic = %letter.source_topic,
            partition = letter.partition,
            offset = letter.offset,
            error = %letter.error_message,
            failure_count = letter.failure_count,
            "💀 Diverting message to dead-letter topic"
        );

        let payload = serde_json::to_string(letter)?;
        let record = FutureRecord::to(&self.topic)
            .key(&letter.key)
            .payload(&payload);

        self.producer
            .send(record, Timeout::After(self.send_timeout))
            .await
            .map_err(|(error, _)| error)
            .context("failed to publish dead letter")?;

        self.metrics.dlq_messages.inc();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_letter_round_trips_through_json() {
        let letter = DeadLetter {
            key: "order-1".to_string(),
            payload: "{not json".to_string(),
            source_topic: "orders.created".to_string(),
            partition: 3,
            offset: 42,
            error_message: "Malformed event payload".to_string(),
            failure_count: 5,
            first_failed_at: Utc::now(),
            last_failed_at: Utc::now(),
        };

        let json = serde_json::to_string(&letter).unwrap();
        let parsed: DeadLetter = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.offset, 42);
        assert_eq!(parsed.failure_count, 5);
        assert_eq!(parsed.payload, "{not json");

        // Provenance fields use the shared camelCase wire convention
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value.get("sourceTopic").is_some());
        assert!(value.get("firstFailedAt").is_some());
    }
}
