// ============================================================================
// Messaging
// ============================================================================
//
// Everything that touches the broker: the keyed publisher, the consumer
// loop with manual offset commits, and the dead-letter queue.
//
// ============================================================================

pub mod consumer;
pub mod dlq;
pub mod publisher;

pub use consumer::FulfillmentWorker;
pub use dlq::{DeadLetter, DeadLetterQueue};
pub use publisher::{EventPublisher, KafkaEventPublisher, PublishError};
