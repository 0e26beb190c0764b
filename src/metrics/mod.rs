use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

// ============================================================================
// Metrics
// ============================================================================
//
// Prometheus metrics for the whole pipeline:
// - order creation and validation rejections
// - event publish outcomes
// - consumer dispatch outcomes and processing latency
// - shipping attempts per outcome
// - dead letter diversions
// - publisher circuit breaker state
//
// Scraped via GET /metrics on the HTTP server.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Creation path
    pub orders_created: IntCounter,
    pub orders_rejected: IntCounter,
    pub events_published: IntCounter,
    pub events_publish_failed: IntCounter,

    // Fulfillment path
    pub events_processed: IntCounterVec,
    pub dispatch_failures: IntCounter,
    pub processing_duration: Histogram,
    pub shipping_outcomes: IntCounterVec,

    // Hardening
    pub dlq_messages: IntCounter,
    pub circuit_breaker_state: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_created = IntCounter::new("orders_created_total", "Orders successfully created")?;
        registry.register(Box::new(orders_created.clone()))?;

        let orders_rejected = IntCounter::new(
            "orders_rejected_total",
            "Order creation requests rejected by validation",
        )?;
        registry.register(Box::new(orders_rejected.clone()))?;

        let events_published = IntCounter::new(
            "events_published_total",
            "Order events acknowledged by the broker",
        )?;
        registry.register(Box::new(events_published.clone()))?;

        let events_publish_failed = IntCounter::new(
            "events_publish_failed_total",
            "Order events that could not be published (order left Pending)",
        )?;
        registry.register(Box::new(events_publish_failed.clone()))?;

        let events_processed = IntCounterVec::new(
            Opts::new("events_processed_total", "Consumed events by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(events_processed.clone()))?;

        let dispatch_failures = IntCounter::new(
            "dispatch_failures_total",
            "Event dispatches that failed and were left uncommitted",
        )?;
        registry.register(Box::new(dispatch_failures.clone()))?;

        let processing_duration = Histogram::with_opts(
            HistogramOpts::new(
                "event_processing_duration_seconds",
                "End-to-end orchestrator processing time per event",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0]),
        )?;
        registry.register(Box::new(processing_duration.clone()))?;

        let shipping_outcomes = IntCounterVec::new(
            Opts::new("shipping_outcomes_total", "Shipping gateway results"),
            &["outcome"],
        )?;
        registry.register(Box::new(shipping_outcomes.clone()))?;

        let dlq_messages = IntCounter::new(
            "dlq_messages_total",
            "Messages diverted to the dead-letter topic",
        )?;
        registry.register(Box::new(dlq_messages.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "publisher_circuit_breaker_state",
            "Publisher circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            orders_rejected,
            events_published,
            events_publish_failed,
            events_processed,
            dispatch_failures,
            processing_duration,
            shipping_outcomes,
            dlq_messages,
            circuit_breaker_state,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_processed(&self, outcome: &str, duration_secs: f64) {
        self.events_processed.with_label_values(&[outcome]).inc();
        self.processing_duration.observe(duration_secs);
    }

    pub fn record_shipping(&self, success: bool) {
        let outcome = if success { "shipped" } else { "failed" };
        self.shipping_outcomes.with_label_values(&[outcome]).inc();
    }
}
