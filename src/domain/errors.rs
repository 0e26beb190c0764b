use serde::Serialize;
use uuid::Uuid;

use super::order::OrderStatus;

// ============================================================================
// Order Error Taxonomy
// ============================================================================
//
// Validation and NotFound surface to API callers; the rest stay inside the
// pipeline. Fulfillment failures are never errors at this level, they are
// the Failed order status.
//
// ============================================================================

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order validation failed with {} violation(s)", violations.len())]
    Validation { violations: Vec<FieldViolation> },

    #[error("Order not found: {0}")]
    NotFound(Uuid),

    #[error("Order already exists: {0}")]
    DuplicateOrder(Uuid),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_reports_violation_count() {
        let err = OrderError::Validation {
            violations: vec![
                FieldViolation::new("customerId", "must not be empty"),
                FieldViolation::new("items", "at least one item is required"),
            ],
        };
        assert_eq!(err.to_string(), "Order validation failed with 2 violation(s)");
    }

    #[test]
    fn transition_error_names_both_states() {
        let err = OrderError::InvalidTransition {
            from: OrderStatus::Shipped,
            to: OrderStatus::Processing,
        };
        assert_eq!(
            err.to_string(),
            "Invalid status transition: Shipped -> Processing"
        );
    }
}
