// ============================================================================
// Storage Abstractions
// ============================================================================
//
// Trait-backed stores with in-memory backends for development. Durable
// backends slot in behind the same traits without changing any caller.
//
// ============================================================================

pub mod idempotency;
pub mod order_store;

pub use idempotency::{
    IdempotencyLedger, InMemoryIdempotencyLedger, LedgerError, MarkOutcome, ProcessedEventRecord,
};
pub use order_store::{InMemoryOrderStore, OrderStore, ProcessingClaim};
