use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{FulfillmentDetails, Order, OrderError, OrderStatus};

// ============================================================================
// Order Store
// ============================================================================
//
// Injected storage abstraction for order records. The lifecycle manager and
// the orchestrator only see this trait; a durable backend can replace the
// in-memory one without touching either.
//
// Transition checks live behind the store's lock, so a stale or duplicate
// status update can never regress an order that raced ahead. updated_at is
// stamped monotonically non-decreasing on every write.
//
// ============================================================================

/// Outcome of an attempt to take ownership of an order for fulfillment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingClaim {
    /// This caller now owns the order; status is Processing
    Claimed,
    /// Another worker moved the order to Processing recently
    InFlight,
    /// A previous attempt already reached a terminal status
    AlreadyTerminal(OrderStatus),
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a new order. Order identifiers are never reused.
    async fn insert(&self, order: Order) -> Result<(), OrderError>;

    /// Pure read.
    async fn get(&self, order_id: Uuid) -> Result<Option<Order>, OrderError>;

    /// Apply a forward status transition, merging any fulfillment details.
    /// Invalid transitions are rejected, not silently applied.
    async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        details: Option<FulfillmentDetails>,
    ) -> Result<Order, OrderError>;

    /// Atomically move the order to Processing, disambiguating races between
    /// concurrent workers. A Processing order whose updated_at is older than
    /// `stale_after` is treated as abandoned and may be re-claimed.
    async fn claim_processing(
        &self,
        order_id: Uuid,
        stale_after: Duration,
    ) -> Result<ProcessingClaim, OrderError>;
}

// ============================================================================
// In-Memory Backend
// ============================================================================

pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<Uuid, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self {
            orders: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Stamp updated_at without ever moving it backwards, even if the wall
/// clock does.
fn touch(order: &mut Order) {
    order.updated_at = Utc::now().max(order.updated_at);
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> Result<(), OrderError> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(OrderError::DuplicateOrder(order.id));
        }
        orders.insert(order.id, order);
        Ok(())
    }

    async fn get(&self, order_id: Uuid) -> Result<Option<Order>, OrderError> {
        Ok(self.orders.read().await.get(&order_id).cloned())
    }

    async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        details: Option<FulfillmentDetails>,
    ) -> Result<Order, OrderError> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(&order_id)
            .ok_or(OrderError::NotFound(order_id))?;

        if !order.status.can_transition_to(new_status) {
            return Err(OrderError::InvalidTransition {
                from: order.status,
                to: new_status,
            });
        }

        order.status = new_status;
        if let Some(update) = details {
            match order.fulfillment.as_mut() {
                Some(existing) => existing.merge(update),
                None => order.fulfillment = Some(update),
            }
        }
        touch(order);

        Ok(order.clone())
    }

    async fn claim_processing(
        &self,
        order_id: Uuid,
        stale_after: Duration,
    ) -> Result<ProcessingClaim, OrderError> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(&order_id)
            .ok_or(OrderError::NotFound(order_id))?;

        match order.status {
            status if status.is_terminal() => Ok(ProcessingClaim::AlreadyTerminal(status)),
            OrderStatus::Processing => {
                let age = Utc::now().signed_duration_since(order.updated_at);
                if age.to_std().unwrap_or(Duration::ZERO) >= stale_after {
                    // Abandoned by a crashed worker, take it over
                    touch(order);
                    Ok(ProcessingClaim::Claimed)
                } else {
                    Ok(ProcessingClaim::InFlight)
                }
            }
            _ => {
                order.status = OrderStatus::Processing;
                touch(order);
                Ok(ProcessingClaim::Claimed)
            }
        }
    }
}
