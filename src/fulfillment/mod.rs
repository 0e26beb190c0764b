// ============================================================================
// Fulfillment
// ============================================================================
//
// The asynchronous half of the pipeline: the orchestrator takes a consumed
// OrderCreated event to a terminal status through the shipping gateway.
//
// ============================================================================

pub mod orchestrator;
pub mod shipping;

pub use orchestrator::{FulfillmentOrchestrator, ProcessError, ProcessOutcome};
pub use shipping::{
    ShippingConfig, ShippingGateway, ShippingResult, SimulatedShippingGateway, CARRIERS,
};
