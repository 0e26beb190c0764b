use std::collections::hash_map::Entry;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

// ============================================================================
// Idempotency Ledger
// ============================================================================
//
// Durable record of event identifiers that have been fully processed. The
// broker gives at-least-once delivery; this ledger is what upgrades the
// application effect to at-most-once. Records are write-once: never updated,
// never deleted.
//
// Uniqueness is enforced by the storage layer itself (a single atomic entry
// insert under the store's lock), not by a caller-side check, because two
// workers can both pass is_processed() before either records the event.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedEventRecord {
    pub event_id: Uuid,
    pub order_id: Uuid,
    pub processed_at: DateTime<Utc>,
}

/// Result of a mark attempt. AlreadyMarked means another worker won the
/// race; callers treat it as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    Recorded,
    AlreadyMarked,
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Ledger backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait IdempotencyLedger: Send + Sync {
    /// Advisory pre-check. Passing it does not grant ownership of the event.
    async fn is_processed(&self, event_id: Uuid) -> Result<bool, LedgerError>;

    /// Record the event as fully processed. Atomic: exactly one caller per
    /// event id ever observes Recorded.
    async fn mark_processed(
        &self,
        event_id: Uuid,
        order_id: Uuid,
    ) -> Result<MarkOutcome, LedgerError>;
}

// ============================================================================
// In-Memory Backend
// ============================================================================

pub struct InMemoryIdempotencyLedger {
    records: Mutex<HashMap<Uuid, ProcessedEventRecord>>,
}

impl InMemoryIdempotencyLedger {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Number of records held. Test and diagnostics helper.
    pub async fn record_count(&self) -> usize {
        self.records.lock().await.len()
    }
}

impl Default for InMemoryIdempotencyLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdempotencyLedger for InMemoryIdempotencyLedger {
    async fn is_processed(&self, event_id: Uuid) -> Result<bool, LedgerError> {
        Ok(self.records.lock().await.contains_key(&event_id))
    }

    async fn mark_processed(
        &self,
        event_id: Uuid,
        order_id: Uuid,
    ) -> Result<MarkOutcome, LedgerError> {
        let mut records = self.records.lock().await;
        match records.entry(event_id) {
            Entry::Occupied(_) => Ok(MarkOutcome::AlreadyMarked),
            Entry::Vacant(slot) => {
                slot.insert(ProcessedEventRecord {
                    event_id,
                    order_id,
                    processed_at: Utc::now(),
                });
                Ok(MarkOutcome::Recorded)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn unseen_event_is_not_processed() {
        let ledger = InMemoryIdempotencyLedger::new();
        assert!(!ledger.is_processed(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn first_mark_records_second_is_duplicate() {
        let ledger = InMemoryIdempotencyLedger::new();
        let event_id = Uuid::new_v4();
        let order_id = Uuid::new_v4();

        assert_eq!(
            ledger.mark_processed(event_id, order_id).await.unwrap(),
            MarkOutcome::Recorded
        );
        assert_eq!(
            ledger.mark_processed(event_id, order_id).await.unwrap(),
            MarkOutcome::AlreadyMarked
        );
        assert!(ledger.is_processed(event_id).await.unwrap());
        assert_eq!(ledger.record_count().await, 1);
    }

    #[tokio::test]
    async fn concurrent_marks_record_exactly_once() {
        let ledger = Arc::new(InMemoryIdempotencyLedger::new());
        let event_id = Uuid::new_v4();
        let order_id = Uuid::new_v4();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.mark_processed(event_id, order_id).await.unwrap()
            }));
        }

        let mut recorded = 0;
        for handle in handles {
            if handle.await.unwrap() == MarkOutcome::Recorded {
                recorded += 1;
            }
        }

        assert_eq!(recorded, 1);
        assert_eq!(ledger.record_count().await, 1);
    }
}
