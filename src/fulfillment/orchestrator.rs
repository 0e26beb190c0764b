use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::domain::{FulfillmentDetails, OrderCreatedEvent, OrderError, OrderStatus};
use crate::lifecycle::OrderLifecycleManager;
use crate::metrics::Metrics;
use crate::store::{IdempotencyLedger, LedgerError, MarkOutcome, ProcessingClaim};

use super::shipping::{ShippingGateway, ShippingResult};

// ============================================================================
// Fulfillment Orchestrator
// ============================================================================
//
// Drives one OrderCreated event to a terminal Shipped/Failed status.
//
// Redelivery safety rests on two storage-level guarantees, not on the
// advisory pre-check:
// - the order store's claim_processing is atomic, so of N workers holding
//   the same event exactly one wins the Processing transition and ships;
// - the ledger's mark_processed is write-once, so a lost race surfaces as
//   AlreadyMarked and is treated as success.
//
// The status write-back happens before the ledger write. If the process
// dies between the two, redelivery finds a terminal order with no ledger
// record and backfills the record without shipping again.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Shipped (or terminally failed) and recorded
    Completed,
    /// Ledger already had the event; nothing was done
    Duplicate,
    /// Order was already terminal; only the ledger record was backfilled
    RecoveredTerminal,
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// Another worker holds a fresh Processing claim; retry later
    #[error("Order {0} is already being fulfilled by another worker")]
    InFlight(Uuid),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ProcessError {
    /// In-flight contention is not a failure of this message, only a signal
    /// to redeliver it once the owning worker has finished.
    pub fn is_contention(&self) -> bool {
        matches!(self, ProcessError::InFlight(_))
    }
}

pub struct FulfillmentOrchestrator {
    manager: Arc<OrderLifecycleManager>,
    ledger: Arc<dyn IdempotencyLedger>,
    gateway: Arc<dyn ShippingGateway>,
    /// Processing claims older than this are considered abandoned
    stale_after: Duration,
    metrics: Arc<Metrics>,
}

impl FulfillmentOrchestrator {
    pub fn new(
        manager: Arc<OrderLifecycleManager>,
        ledger: Arc<dyn IdempotencyLedger>,
        gateway: Arc<dyn ShippingGateway>,
        stale_after: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            manager,
            ledger,
            gateway,
            stale_after,
            metrics,
        }
    }

    pub async fn process(&self, event: &OrderCreatedEvent) -> Result<ProcessOutcome, ProcessError> {
        let started = Instant::now();
        let event_id = event.event_id;
        let order_id = event.order_id;

        if self.ledger.is_processed(event_id).await? {
            tracing::info!(
                event_id = %event_id,
                order_id = %order_id,
                "Duplicate event, skipping"
            );
            self.metrics.record_processed("duplicate", started.elapsed().as_secs_f64());
            return Ok(ProcessOutcome::Duplicate);
        }

        match self.manager.claim_processing(order_id, self.stale_after).await? {
            ProcessingClaim::Claimed => {}
            ProcessingClaim::InFlight => {
                return Err(ProcessError::InFlight(order_id));
            }
            ProcessingClaim::AlreadyTerminal(status) => {
                // A previous attempt shipped but died before the ledger
                // write; complete that unit of work without shipping again.
                tracing::warn!(
                    event_id = %event_id,
                    order_id = %order_id,
                    status = %status,
                    "Order already terminal, backfilling ledger record"
                );
                self.mark_event(event_id, order_id).await?;
                self.metrics
                    .record_processed("recovered", started.elapsed().as_secs_f64());
                return Ok(ProcessOutcome::RecoveredTerminal);
            }
        }

        tracing::info!(
            event_id = %event_id,
            order_id = %order_id,
            correlation_id = %event.metadata.correlation_id,
            "Starting fulfillment"
        );

        match self
            .gateway
            .ship(order_id, event.metadata.correlation_id)
            .await
        {
            ShippingResult::Shipped {
                tracking_number,
                carrier,
                shipped_at,
            } => {
                self.metrics.record_shipping(true);
                let details = FulfillmentDetails::shipped(tracking_number, carrier, shipped_at);
                self.manager
                    .update_status(order_id, OrderStatus::Shipped, Some(details))
                    .await?;
            }
            ShippingResult::Failed { error_message } => {
                // A normal, expected outcome: the order fails, the event
                // still completes.
                self.metrics.record_shipping(false);
                let details = FulfillmentDetails::failed(error_message);
                self.manager
                    .update_status(order_id, OrderStatus::Failed, Some(details))
                    .await?;
            }
        }

        self.mark_event(event_id, order_id).await?;
        self.metrics
            .record_processed("completed", started.elapsed().as_secs_f64());
        Ok(ProcessOutcome::Completed)
    }

    async fn mark_event(&self, event_id: Uuid, order_id: Uuid) -> Result<(), ProcessError> {
        match self.ledger.mark_processed(event_id, order_id).await? {
            MarkOutcome::Recorded => {}
            MarkOutcome::AlreadyMarked => {
                tracing::warn!(
                    event_id = %event_id,
                    order_id = %order_id,
                    "Another worker already recorded this event"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderItem;
    use crate::lifecycle::CreateOrderRequest;
    use crate::messaging::publisher::PublishError;
    use crate::messaging::EventPublisher;
    use crate::store::{InMemoryIdempotencyLedger, InMemoryOrderStore};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct SilentPublisher;

    #[async_trait]
    impl EventPublisher for SilentPublisher {
        async fn publish(&self, _event: &OrderCreatedEvent) -> Result<(), PublishError> {
            Ok(())
        }
    }

    // Gateway double that counts calls and returns a fixed outcome after an
    // optional hold, so races can be staged deterministically.
    struct CountingGateway {
        calls: AtomicU32,
        fail: bool,
        hold: Duration,
    }

    impl CountingGateway {
        fn succeeding() -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail: false,
                hold: Duration::ZERO,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::succeeding()
            }
        }

        fn slow(hold: Duration) -> Self {
            Self {
                hold,
                ..Self::succeeding()
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ShippingGateway for CountingGateway {
        async fn ship(&self, _order_id: Uuid, _correlation_id: Uuid) -> ShippingResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.hold.is_zero() {
                tokio::time::sleep(self.hold).await;
            }
            if self.fail {
                ShippingResult::Failed {
                    error_message: "carrier unreachable".to_string(),
                }
            } else {
                ShippingResult::Shipped {
                    tracking_number: "TRK-0000000001".to_string(),
                    carrier: "UPS".to_string(),
                    shipped_at: Utc::now(),
                }
            }
        }
    }

    struct Pipeline {
        manager: Arc<OrderLifecycleManager>,
        orchestrator: Arc<FulfillmentOrchestrator>,
        ledger: Arc<InMemoryIdempotencyLedger>,
        gateway: Arc<CountingGateway>,
    }

    fn pipeline(gateway: CountingGateway) -> Pipeline {
        let metrics = Arc::new(Metrics::new().unwrap());
        let store = Arc::new(InMemoryOrderStore::new());
        let ledger = Arc::new(InMemoryIdempotencyLedger::new());
        let gateway = Arc::new(gateway);
        let manager = Arc::new(OrderLifecycleManager::new(
            store,
            Arc::new(SilentPublisher),
            metrics.clone(),
        ));
        let orchestrator = Arc::new(FulfillmentOrchestrator::new(
            manager.clone(),
            ledger.clone(),
            gateway.clone(),
            Duration::from_secs(60),
            metrics,
        ));
        Pipeline {
            manager,
            orchestrator,
            ledger,
            gateway,
        }
    }

    async fn created_event(pipeline: &Pipeline) -> OrderCreatedEvent {
        let created = pipeline
            .manager
            .create_order(CreateOrderRequest {
                customer_id: "cust-1".to_string(),
                customer_name: "Ada Lovelace".to_string(),
                items: vec![OrderItem {
                    product_id: "sku-1".to_string(),
                    quantity: 2,
                }],
            })
            .await
            .unwrap();
        let order = pipeline.manager.get_order(created.order_id).await.unwrap();
        OrderCreatedEvent::from_order(&order, Uuid::new_v4())
    }

    #[tokio::test]
    async fn successful_fulfillment_reaches_shipped() {
        let p = pipeline(CountingGateway::succeeding());
        let event = created_event(&p).await;

        let outcome = p.orchestrator.process(&event).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Completed);

        let order = p.manager.get_order(event.order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Shipped);
        let details = order.fulfillment.unwrap();
        assert_eq!(details.tracking_number.as_deref(), Some("TRK-0000000001"));
        assert_eq!(details.carrier.as_deref(), Some("UPS"));
        assert!(details.shipped_at.is_some());

        assert!(p.ledger.is_processed(event.event_id).await.unwrap());
        assert_eq!(p.gateway.call_count(), 1);
    }

    #[tokio::test]
    async fn shipping_failure_is_a_terminal_status_not_an_error() {
        let p = pipeline(CountingGateway::failing());
        let event = created_event(&p).await;

        let outcome = p.orchestrator.process(&event).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Completed);

        let order = p.manager.get_order(event.order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Failed);
        assert_eq!(
            order.fulfillment.unwrap().error_message.as_deref(),
            Some("carrier unreachable")
        );
        // The event is done: a retry must not ship a failed order
        assert!(p.ledger.is_processed(event.event_id).await.unwrap());
    }

    #[tokio::test]
    async fn redelivered_event_is_a_no_op() {
        let p = pipeline(CountingGateway::succeeding());
        let event = created_event(&p).await;

        assert_eq!(
            p.orchestrator.process(&event).await.unwrap(),
            ProcessOutcome::Completed
        );
        assert_eq!(
            p.orchestrator.process(&event).await.unwrap(),
            ProcessOutcome::Duplicate
        );

        assert_eq!(p.gateway.call_count(), 1);
        assert_eq!(p.ledger.record_count().await, 1);
    }

    #[tokio::test]
    async fn concurrent_redelivery_ships_exactly_once() {
        // Hold the winner inside the gateway long enough for the loser to
        // pass the ledger pre-check and hit the claim.
        let p = pipeline(CountingGateway::slow(Duration::from_millis(100)));
        let event = created_event(&p).await;

        let a = {
            let orchestrator = p.orchestrator.clone();
            let event = event.clone();
            tokio::spawn(async move { orchestrator.process(&event).await })
        };
        let b = {
            let orchestrator = p.orchestrator.clone();
            let event = event.clone();
            tokio::spawn(async move { orchestrator.process(&event).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let completed = results
            .iter()
            .filter(|r| matches!(r, Ok(ProcessOutcome::Completed)))
            .count();
        let contended = results
            .iter()
            .filter(|r| matches!(r, Err(e) if e.is_contention()))
            .count();

        assert_eq!(completed, 1);
        assert_eq!(contended, 1);
        assert_eq!(p.gateway.call_count(), 1);
        assert_eq!(p.ledger.record_count().await, 1);

        // The contended delivery resolves as a duplicate once retried
        assert_eq!(
            p.orchestrator.process(&event).await.unwrap(),
            ProcessOutcome::Duplicate
        );
        assert_eq!(p.gateway.call_count(), 1);
    }

    #[tokio::test]
    async fn lost_ledger_write_is_backfilled_without_reshipping() {
        let p = pipeline(CountingGateway::succeeding());
        let event = created_event(&p).await;

        // Simulate a crash after the status write-back: order is terminal,
        // ledger never heard of the event.
        p.manager
            .claim_processing(event.order_id, Duration::from_secs(60))
            .await
            .unwrap();
        p.manager
            .update_status(
                event.order_id,
                OrderStatus::Shipped,
                Some(FulfillmentDetails::shipped(
                    "TRK-9".to_string(),
                    "DHL".to_string(),
                    Utc::now(),
                )),
            )
            .await
            .unwrap();

        let outcome = p.orchestrator.process(&event).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::RecoveredTerminal);
        assert_eq!(p.gateway.call_count(), 0);
        assert!(p.ledger.is_processed(event.event_id).await.unwrap());
    }

    #[tokio::test]
    async fn event_for_unknown_order_is_an_error_for_redelivery() {
        let p = pipeline(CountingGateway::succeeding());
        let order = crate::domain::Order::new(
            "cust-x".to_string(),
            "Nobody".to_string(),
            vec![OrderItem {
                product_id: "sku-0".to_string(),
                quantity: 1,
            }],
        );
        let event = OrderCreatedEvent::from_order(&order, Uuid::new_v4());

        let result = p.orchestrator.process(&event).await;
        assert!(matches!(
            result,
            Err(ProcessError::Order(OrderError::NotFound(_)))
        ));
        assert_eq!(p.gateway.call_count(), 0);
        assert_eq!(p.ledger.record_count().await, 0);
    }
}
