// ============================================================================
// Order Domain
// ============================================================================
//
// Everything the rest of the service agrees on:
// - order record, items, status state machine (order)
// - the OrderCreated wire contract and its codec (events)
// - the error taxonomy (errors)
//
// ============================================================================

pub mod errors;
pub mod events;
pub mod order;

pub use errors::{FieldViolation, OrderError};
pub use events::{EventCodecError, OrderCreatedEvent};
pub use order::{FulfillmentDetails, Order, OrderItem, OrderStatus};
