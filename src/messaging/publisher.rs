use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;

use crate::domain::{EventCodecError, OrderCreatedEvent};
use crate::metrics::Metrics;
use crate::utils::{
    retry_with_backoff, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState,
    RetryConfig,
};

// ============================================================================
// Event Publisher
// ============================================================================
//
// Sends OrderCreated events to the broker, keyed by order id so that every
// event for one order lands in the same partition and keeps per-order
// ordering. The caller is never blocked past the send timeout: bounded
// retry runs behind a circuit breaker, and a broker outage surfaces as a
// PublishError the caller can absorb.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Codec(#[from] EventCodecError),

    #[error("Broker circuit open, publish rejected")]
    CircuitOpen,

    #[error("Broker unavailable after {attempts} attempt(s): {reason}")]
    BrokerUnavailable { attempts: u32, reason: String },
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &OrderCreatedEvent) -> Result<(), PublishError>;
}

pub struct KafkaEventPublisher {
    producer: FutureProducer,
    topic: String,
    send_timeout: Duration,
    retry: RetryConfig,
    circuit_breaker: CircuitBreaker,
    metrics: Arc<Metrics>,
}

impl KafkaEventPublisher {
    pub fn new(
        brokers: &str,
        topic: String,
        send_timeout: Duration,
        retry: RetryConfig,
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
            retry,
            circuit_breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
            metrics,
        })
    }

    async fn send_once(&self, key: &str, payload: &str) -> Result<(), String> {
        let record = FutureRecord::to(&self.topic).key(key).payload(payload);
        self.producer
            .send(record, Timeout::After(self.send_timeout))
            .await
            .map(|_| ())
            .map_err(|(error, _)| error.to_string())
    }

    async fn update_breaker_gauge(&self) {
        let state = match self.circuit_breaker.state().await {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        };
        self.metrics.circuit_breaker_state.set(state);
    }
}

#[async_trait]
impl EventPublisher for KafkaEventPublisher {
    async fn publish(&self, event: &OrderCreatedEvent) -> Result<(), PublishError> {
        let payload = event.encode()?;
        let key = event.order_id.to_string();

        let result = self
            .circuit_breaker
            .call(retry_with_backoff(&self.retry, "publish", |_attempt| {
                self.send_once(&key, &payload)
            }))
            .await;
        self.update_breaker_gauge().await;

        match result {
            Ok(()) => {
                tracing::info!(
                    topic = %self.topic,
                    order_id = %event.order_id,
                    event_id = %event.event_id,
                    "Published order event"
                );
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::error!(
                    topic = %self.topic,
                    order_id = %event.order_id,
                    "Circuit breaker open, broker unavailable"
                );
                Err(PublishError::CircuitOpen)
            }
            Err(CircuitBreakerError::OperationFailed(reason)) => {
                Err(PublishError::BrokerUnavailable {
                    attempts: self.retry.max_attempts,
                    reason,
                })
            }
        }
    }
}
