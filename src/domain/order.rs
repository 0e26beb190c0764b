use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Order Domain Model
// ============================================================================
//
// The order record and its status state machine. Status only ever moves
// forward:
//
//   Created ──▶ Pending ──▶ Processing ──▶ Shipped
//      │                        │
//      └──────▶ Processing ◀────┘──▶ Failed
//
// Pending exists only for orders whose creation event could not be confirmed
// published. Shipped and Failed are terminal.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub customer_id: String,
    pub customer_name: String,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    /// Populated once a shipping attempt has reached a terminal outcome
    pub fulfillment: Option<FulfillmentDetails>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(customer_id: String, customer_name: String, items: Vec<OrderItem>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            customer_id,
            customer_name,
            items,
            status: OrderStatus::Created,
            fulfillment: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderStatus {
    Created,
    Pending,
    Processing,
    Shipped,
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Shipped | OrderStatus::Failed)
    }

    /// Transition table of the order state machine. Anything not listed here
    /// is rejected, never silently applied.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Created, Pending)
                | (Created, Processing)
                | (Pending, Processing)
                | (Processing, Shipped)
                | (Processing, Failed)
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OrderStatus::Created => "Created",
            OrderStatus::Pending => "Pending",
            OrderStatus::Processing => "Processing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Failed => "Failed",
        };
        f.write_str(name)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentDetails {
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl FulfillmentDetails {
    pub fn shipped(tracking_number: String, carrier: String, shipped_at: DateTime<Utc>) -> Self {
        Self {
            tracking_number: Some(tracking_number),
            carrier: Some(carrier),
            shipped_at: Some(shipped_at),
            error_message: None,
        }
    }

    pub fn failed(error_message: String) -> Self {
        Self {
            error_message: Some(error_message),
            ..Self::default()
        }
    }

    /// Overlay `other` onto self, keeping existing values where the update
    /// carries none.
    pub fn merge(&mut self, other: FulfillmentDetails) {
        if other.tracking_number.is_some() {
            self.tracking_number = other.tracking_number;
        }
        if other.carrier.is_some() {
            self.carrier = other.carrier;
        }
        if other.shipped_at.is_some() {
            self.shipped_at = other.shipped_at;
        }
        if other.error_message.is_some() {
            self.error_message = other.error_message;
        }
    }
}
