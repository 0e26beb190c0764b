use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::order::{Order, OrderItem};

// ============================================================================
// Order Event Contract
// ============================================================================
//
// The versioned wire format shared by the publisher and every fulfillment
// worker. An event is an immutable snapshot of the order at creation time,
// not a live reference. Consumers tolerate unknown fields (forward
// compatibility) and reject payloads missing required ones; both follow from
// serde's defaults, so the codec only adds the event-type check on top.
//
// ============================================================================

pub const ORDER_CREATED_EVENT_TYPE: &str = "OrderCreated";
pub const EVENT_SOURCE: &str = "order-fulfillment";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedEvent {
    /// Unique per publish attempt, keys the idempotency ledger
    pub event_id: Uuid,
    pub event_type: String,
    pub order_id: Uuid,
    pub customer: CustomerSnapshot,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub metadata: EventMetadata,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSnapshot {
    pub customer_id: String,
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    /// Schema/source tag of the producing service
    pub source: String,
    /// Groups the creation request with everything it caused downstream
    pub correlation_id: Uuid,
}

#[derive(Debug, thiserror::Error)]
pub enum EventCodecError {
    #[error("Malformed event payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unexpected event type: {0}")]
    UnexpectedType(String),
}

impl OrderCreatedEvent {
    /// Snapshot `order` into a fresh event with its own event id.
    pub fn from_order(order: &Order, correlation_id: Uuid) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: ORDER_CREATED_EVENT_TYPE.to_string(),
            order_id: order.id,
            customer: CustomerSnapshot {
                customer_id: order.customer_id.clone(),
                name: order.customer_name.clone(),
            },
            items: order.items.clone(),
            created_at: Utc::now(),
            metadata: EventMetadata {
                source: EVENT_SOURCE.to_string(),
                correlation_id,
            },
        }
    }

    pub fn encode(&self) -> Result<String, EventCodecError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, EventCodecError> {
        let event: Self = serde_json::from_slice(payload)?;
        if event.event_type != ORDER_CREATED_EVENT_TYPE {
            return Err(EventCodecError::UnexpectedType(event.event_type));
        }
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order() -> Order {
        Order::new(
            "cust-42".to_string(),
            "Grace Hopper".to_string(),
            vec![OrderItem {
                product_id: "sku-1".to_string(),
                quantity: 2,
            }],
        )
    }

    #[test]
    fn event_snapshots_order_data() {
        let order = sample_order();
        let correlation_id = Uuid::new_v4();
        let event = OrderCreatedEvent::from_order(&order, correlation_id);

        assert_eq!(event.event_type, ORDER_CREATED_EVENT_TYPE);
        assert_eq!(event.order_id, order.id);
        assert_eq!(event.customer.customer_id, "cust-42");
        assert_eq!(event.customer.name, "Grace Hopper");
        assert_eq!(event.items, order.items);
        assert_eq!(event.metadata.correlation_id, correlation_id);
        assert_eq!(event.metadata.source, EVENT_SOURCE);
    }

    #[test]
    fn each_publish_attempt_gets_a_distinct_event_id() {
        let order = sample_order();
        let a = OrderCreatedEvent::from_order(&order, Uuid::new_v4());
        let b = OrderCreatedEvent::from_order(&order, Uuid::new_v4());
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn wire_format_uses_camel_case_field_names() {
        let event = OrderCreatedEvent::from_order(&sample_order(), Uuid::new_v4());
        let json: serde_json::Value =
            serde_json::from_str(&event.encode().unwrap()).unwrap();

        assert!(json.get("eventId").is_some());
        assert_eq!(json["eventType"], "OrderCreated");
        assert!(json.get("orderId").is_some());
        assert!(json["customer"].get("customerId").is_some());
        assert!(json["items"][0].get("productId").is_some());
        assert!(json["metadata"].get("correlationId").is_some());
    }

    #[test]
    fn decode_tolerates_unknown_fields() {
        let payload = serde_json::json!({
            "eventId": Uuid::new_v4(),
            "eventType": "OrderCreated",
            "orderId": Uuid::new_v4(),
            "customer": {"customerId": "c-1", "name": "Ada"},
            "items": [{"productId": "sku-9", "quantity": 1}],
            "createdAt": "2024-05-01T12:00:00Z",
            "metadata": {"source": "order-fulfillment", "correlationId": Uuid::new_v4()},
            "someFutureField": {"nested": true}
        });

        let event = OrderCreatedEvent::decode(payload.to_string().as_bytes()).unwrap();
        assert_eq!(event.customer.name, "Ada");
    }

    #[test]
    fn decode_rejects_missing_required_fields() {
        // No orderId
        let payload = serde_json::json!({
            "eventId": Uuid::new_v4(),
            "eventType": "OrderCreated",
            "customer": {"customerId": "c-1", "name": "Ada"},
            "items": [],
            "createdAt": "2024-05-01T12:00:00Z",
            "metadata": {"source": "order-fulfillment", "correlationId": Uuid::new_v4()}
        });

        let result = OrderCreatedEvent::decode(payload.to_string().as_bytes());
        assert!(matches!(result, Err(EventCodecError::Malformed(_))));
    }

    #[test]
    fn decode_rejects_foreign_event_types() {
        let mut event = OrderCreatedEvent::from_order(&sample_order(), Uuid::new_v4());
        event.event_type = "OrderCancelled".to_string();

        let result = OrderCreatedEvent::decode(event.encode().unwrap().as_bytes());
        assert!(matches!(
            result,
            Err(EventCodecError::UnexpectedType(t)) if t == "OrderCancelled"
        ));
    }

    #[test]
    fn decode_rejects_garbage_payloads() {
        assert!(matches!(
            OrderCreatedEvent::decode(b"not json at all"),
            Err(EventCodecError::Malformed(_))
        ));
    }
}
