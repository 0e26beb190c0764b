use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::Offset;
use tokio::sync::watch;

use crate::domain::OrderCreatedEvent;
use crate::fulfillment::FulfillmentOrchestrator;
use crate::metrics::Metrics;

use super::dlq::{DeadLetter, DeadLetterQueue};

// ============================================================================
// Fulfillment Worker - Event Consumer Loop
// ============================================================================
//
// One logical subscriber group; any number of worker instances join it and
// receive disjoint partition subsets from the broker. Auto-commit is off:
// an offset is committed only after the orchestrator reports success, which
// gives at-least-once processing by construction. Exactly-once application
// effect is the orchestrator's and ledger's job.
//
// On dispatch failure the partition is seeked back to the failed offset so
// the next poll redelivers it. After max_dispatch_failures consecutive
// failures of the same offset the raw message is diverted to the
// dead-letter topic and the offset committed, so one poisoned message can
// never block its partition forever. The commit/rewind/divert decision
// lives in FailureTracker, away from the broker types.
//
// Shutdown is cooperative: the loop watches a shutdown channel and exits
// between messages. Uncommitted in-flight work is simply redelivered after
// restart.
//
// ============================================================================

const CONTENTION_PAUSE: Duration = Duration::from_millis(250);
const FAILURE_PAUSE: Duration = Duration::from_millis(200);

/// One dispatch attempt, reduced to what the commit decision needs.
#[derive(Debug)]
enum DispatchResult {
    /// Orchestrator finished; the offset may be committed
    Done,
    /// Payload can never be processed, retrying will not help
    Poison(String),
    /// Another worker owns the order right now; redeliver without counting
    Contention,
    /// Transient dispatch failure
    Failed(String),
}

/// What to do with the message afterwards.
#[derive(Debug, PartialEq)]
enum Disposition {
    Commit,
    Rewind {
        pause: Duration,
    },
    Divert {
        error: String,
        failure_count: u32,
        first_failed_at: DateTime<Utc>,
    },
}

struct FailureWindow {
    count: u32,
    first_failed_at: DateTime<Utc>,
}

/// Consecutive-failure bookkeeping per (partition, offset). A window is
/// cleared on success, and settled only once a diversion actually reached
/// the dead-letter topic; a failed DLQ publish keeps the window, so the
/// redelivered message diverts again instead of earning a fresh round of
/// retries.
struct FailureTracker {
    max_dispatch_failures: u32,
    windows: HashMap<(i32, i64), FailureWindow>,
}

impl FailureTracker {
    fn new(max_dispatch_failures: u32) -> Self {
        Self {
            max_dispatch_failures,
            windows: HashMap::new(),
        }
    }

    fn disposition(&mut self, slot: (i32, i64), result: DispatchResult) -> Disposition {
        match result {
            DispatchResult::Done => {
                self.windows.remove(&slot);
                Disposition::Commit
            }
            DispatchResult::Contention => Disposition::Rewind {
                pause: CONTENTION_PAUSE,
            },
            DispatchResult::Poison(error) => {
                let (failure_count, first_failed_at) = self.bump(slot);
                Disposition::Divert {
                    error,
                    failure_count,
                    first_failed_at,
                }
            }
            DispatchResult::Failed(error) => {
                let (failure_count, first_failed_at) = self.bump(slot);
                if failure_count >= self.max_dispatch_failures {
                    Disposition::Divert {
                        error,
                        failure_count,
                        first_failed_at,
                    }
                } else {
                    tracing::warn!(
                        partition = slot.0,
                        offset = slot.1,
                        failure_count = failure_count,
                        error = %error,
                        "Dispatch failed, offset not committed"
                    );
                    Disposition::Rewind {
                        pause: FAILURE_PAUSE * failure_count,
                    }
                }
            }
        }
    }

    fn bump(&mut self, slot: (i32, i64)) -> (u32, DateTime<Utc>) {
        let window = self.windows.entry(slot).or_insert_with(|| FailureWindow {
            count: 0,
            first_failed_at: Utc::now(),
        });
        window.count += 1;
        (window.count, window.first_failed_at)
    }

    /// The message left the partition; its window is spent.
    fn settle(&mut self, slot: (i32, i64)) {
        self.windows.remove(&slot);
    }
}

pub struct FulfillmentWorker {
    consumer: StreamConsumer,
    topic: String,
    orchestrator: Arc<FulfillmentOrchestrator>,
    dlq: DeadLetterQueue,
    shutdown: watch::Receiver<bool>,
    max_dispatch_failures: u32,
    metrics: Arc<Metrics>,
}

impl FulfillmentWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        brokers: &str,
        group_id: &str,
        topic: &str,
        orchestrator: Arc<FulfillmentOrchestrator>,
        dlq: DeadLetterQueue,
        shutdown: watch::Receiver<bool>,
        max_dispatch_failures: u32,
        metrics: Arc<Metrics>,
    ) -> anyhow::Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()?;
        consumer.subscribe(&[topic])?;

        Ok(Self {
            consumer,
            topic: topic.to_string(),
            orchestrator,
            dlq,
            shutdown,
            max_dispatch_failures,
            metrics,
        })
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        tracing::info!(topic = %self.topic, "Fulfillment worker started");

        let mut failures = FailureTracker::new(self.max_dispatch_failures);
        let mut stream = self.consumer.stream();

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        tracing::info!("Shutdown signal received, stopping fulfillment worker");
                        break;
                    }
                }
                next = stream.next() => {
                    match next {
                        Some(Ok(message)) => {
                            self.handle_message(&message, &mut failures).await;
                        }
                        Some(Err(error)) => {
                            tracing::error!(error = %error, "Broker poll error");
                            tokio::time::sleep(Duration::from_millis(500)).await;
                        }
                        None => break,
                    }
                }
            }
        }

        tracing::info!("Fulfillment worker stopped, uncommitted work will be redelivered");
        Ok(())
    }

    async fn handle_message(
        &self,
        message: &BorrowedMessage<'_>,
        failures: &mut FailureTracker,
    ) {
        let slot = (message.partition(), message.offset());

        let result = match message.payload() {
            None => DispatchResult::Poison("message has no payload".to_string()),
            Some(payload) => match OrderCreatedEvent::decode(payload) {
                Err(error) => DispatchResult::Poison(error.to_string()),
                Ok(event) => match self.orchestrator.process(&event).await {
                    Ok(outcome) => {
                        tracing::debug!(
                            event_id = %event.event_id,
                            order_id = %event.order_id,
                            partition = slot.0,
                            offset = slot.1,
                            outcome = ?outcome,
                            "Event dispatched, committing offset"
                        );
                        DispatchResult::Done
                    }
                    Err(error) if error.is_contention() => {
                        tracing::debug!(
                            event_id = %event.event_id,
                            order_id = %event.order_id,
                            "Order in flight elsewhere, message will be redelivered"
                        );
                        DispatchResult::Contention
                    }
                    Err(error) => {
                        self.metrics.dispatch_failures.inc();
                        DispatchResult::Failed(error.to_string())
                    }
                },
            },
        };

        match failures.disposition(slot, result) {
            Disposition::Commit => self.commit(message),
            Disposition::Rewind { pause } => {
                self.rewind(message);
                tokio::time::sleep(pause).await;
            }
            Disposition::Divert {
                error,
                failure_count,
                first_failed_at,
            } => {
                if self
                    .divert(message, &error, failure_count, first_failed_at)
                    .await
                {
                    failures.settle(slot);
                }
            }
        }
    }

    /// Hand the raw message to the DLQ and commit past it. Returns whether
    /// the diversion happened; if the DLQ publish fails the offset stays
    /// uncommitted and the message comes back on the next poll.
    async fn divert(
        &self,
        message: &BorrowedMessage<'_>,
        error: &str,
        failure_count: u32,
        first_failed_at: DateTime<Utc>,
    ) -> bool {
        let letter = DeadLetter {
            key: message
                .key()
                .map(|k| String::from_utf8_lossy(k).into_owned())
                .unwrap_or_default(),
            payload: message
                .payload()
                .map(|p| String::from_utf8_lossy(p).into_owned())
                .unwrap_or_default(),
            source_topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            error_message: error.to_string(),
            failure_count,
            first_failed_at,
            last_failed_at: Utc::now(),
        };

        match self.dlq.divert(&letter).await {
            Ok(()) => {
                self.commit(message);
                true
            }
            Err(dlq_error) => {
                tracing::error!(
                    error = %dlq_error,
                    partition = letter.partition,
                    offset = letter.offset,
                    "Dead-letter publish failed, leaving offset uncommitted"
                );
                self.rewind(message);
                false
            }
        }
    }

    fn commit(&self, message: &BorrowedMessage<'_>) {
        if let Err(error) = self.consumer.commit_message(message, CommitMode::Async) {
            tracing::warn!(
                partition = message.partition(),
                offset = message.offset(),
                error = %error,
                "Failed to commit offset, message may be redelivered"
            );
        }
    }

    /// Reset the fetch position to the failed offset so the next poll
    /// redelivers it within this session instead of waiting for a restart.
    fn rewind(&self, message: &BorrowedMessage<'_>) {
        if let Err(error) = self.consumer.seek(
            message.topic(),
            message.partition(),
            Offset::Offset(message.offset()),
            Duration::from_secs(5),
        ) {
            tracing::error!(
                partition = message.partition(),
                offset = message.offset(),
                error = %error,
                "Seek failed, redelivery will happen after restart"
            );
        }
    }
}
