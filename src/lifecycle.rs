use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    FieldViolation, FulfillmentDetails, Order, OrderCreatedEvent, OrderError, OrderItem,
    OrderStatus,
};
use crate::messaging::EventPublisher;
use crate::metrics::Metrics;
use crate::store::{OrderStore, ProcessingClaim};

// ============================================================================
// Order Lifecycle Manager
// ============================================================================
//
// Owns the synchronous half of the pipeline: validate, persist, publish.
// The persistence write always completes before publish is attempted, and a
// publish failure never rolls creation back; the order is parked in Pending
// and creation still succeeds from the caller's point of view.
//
// ============================================================================

pub const MAX_CUSTOMER_ID_LEN: usize = 64;
pub const MAX_CUSTOMER_NAME_LEN: usize = 256;
pub const MAX_ITEM_QUANTITY: u32 = 10_000;

#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub customer_id: String,
    pub customer_name: String,
    pub items: Vec<OrderItem>,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreatedOrder {
    pub order_id: Uuid,
    pub status: OrderStatus,
}

pub struct OrderLifecycleManager {
    store: Arc<dyn OrderStore>,
    publisher: Arc<dyn EventPublisher>,
    metrics: Arc<Metrics>,
}

impl OrderLifecycleManager {
    pub fn new(
        store: Arc<dyn OrderStore>,
        publisher: Arc<dyn EventPublisher>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            publisher,
            metrics,
        }
    }

    /// Collect every violation instead of stopping at the first one, so the
    /// caller can fix the whole request in one round trip.
    fn validate(request: &CreateOrderRequest) -> Result<(), OrderError> {
        let mut violations = Vec::new();

        if request.customer_id.trim().is_empty() {
            violations.push(FieldViolation::new("customerId", "must not be empty"));
        } else if request.customer_id.len() > MAX_CUSTOMER_ID_LEN {
            violations.push(FieldViolation::new(
                "customerId",
                format!("must be at most {MAX_CUSTOMER_ID_LEN} characters"),
            ));
        }

        if request.customer_name.trim().is_empty() {
            violations.push(FieldViolation::new("customerName", "must not be empty"));
        } else if request.customer_name.len() > MAX_CUSTOMER_NAME_LEN {
            violations.push(FieldViolation::new(
                "customerName",
                format!("must be at most {MAX_CUSTOMER_NAME_LEN} characters"),
            ));
        }

        if request.items.is_empty() {
            violations.push(FieldViolation::new("items", "at least one item is required"));
        }
        for (index, item) in request.items.iter().enumerate() {
            if item.product_id.trim().is_empty() {
                violations.push(FieldViolation::new(
                    format!("items[{index}].productId"),
                    "must not be empty",
                ));
            }
            if item.quantity == 0 || item.quantity > MAX_ITEM_QUANTITY {
                violations.push(FieldViolation::new(
                    format!("items[{index}].quantity"),
                    format!("must be between 1 and {MAX_ITEM_QUANTITY}"),
                ));
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(OrderError::Validation { violations })
        }
    }

    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<CreatedOrder, OrderError> {
        if let Err(err) = Self::validate(&request) {
            self.metrics.orders_rejected.inc();
            return Err(err);
        }

        let order = Order::new(request.customer_id, request.customer_name, request.items);
        let order_id = order.id;

        // Persist before publish: creation is observable even if the broker
        // is down.
        self.store.insert(order.clone()).await?;
        self.metrics.orders_created.inc();

        let correlation_id = Uuid::new_v4();
        let event = OrderCreatedEvent::from_order(&order, correlation_id);

        tracing::info!(
            order_id = %order_id,
            customer_id = %order.customer_id,
            item_count = order.items.len(),
            correlation_id = %correlation_id,
            "Order created"
        );

        match self.publisher.publish(&event).await {
            Ok(()) => {
                self.metrics.events_published.inc();
                Ok(CreatedOrder {
                    order_id,
                    status: OrderStatus::Created,
                })
            }
            Err(error) => {
                // Publish failure never rolls back creation. Pending marks
                // the order as created-but-unconfirmed.
                self.metrics.events_publish_failed.inc();
                tracing::error!(
                    order_id = %order_id,
                    event_id = %event.event_id,
                    error = %error,
                    "Failed to publish order event, order left Pending"
                );
                let order = self
                    .store
                    .update_status(order_id, OrderStatus::Pending, None)
                    .await?;
                Ok(CreatedOrder {
                    order_id,
                    status: order.status,
                })
            }
        }
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.store
            .get(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))
    }

    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        details: Option<FulfillmentDetails>,
    ) -> Result<Order, OrderError> {
        let order = self.store.update_status(order_id, new_status, details).await?;
        tracing::info!(
            order_id = %order_id,
            status = %order.status,
            "Order status updated"
        );
        Ok(order)
    }

    /// Atomic take-over of an order for fulfillment; see OrderStore.
    pub async fn claim_processing(
        &self,
        order_id: Uuid,
        stale_after: Duration,
    ) -> Result<ProcessingClaim, OrderError> {
        self.store.claim_processing(order_id, stale_after).await
    }
}
