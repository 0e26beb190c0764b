use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod domain;
mod fulfillment;
mod lifecycle;
mod messaging;
mod metrics;
mod store;
mod utils;

use config::Config;
use fulfillment::{FulfillmentOrchestrator, ShippingGateway, SimulatedShippingGateway};
use lifecycle::OrderLifecycleManager;
use messaging::{DeadLetterQueue, EventPublisher, FulfillmentWorker, KafkaEventPublisher};
use metrics::Metrics;
use store::{IdempotencyLedger, InMemoryIdempotencyLedger, InMemoryOrderStore, OrderStore};

// ============================================================================
// Order Fulfillment Service
// ============================================================================
//
// One process hosts both halves of the pipeline:
//
//   HTTP API -> lifecycle manager -> order store
//                                 -> event publisher -> broker
//
//   broker -> fulfillment worker -> orchestrator -> shipping gateway
//                                                -> order store (terminal status)
//                                                -> idempotency ledger
//
// The worker joins a consumer group, so extra replicas of this process
// share partitions and scale fulfillment horizontally.
//
// ============================================================================

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_fulfillment=debug")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        brokers = %config.kafka_brokers,
        orders_topic = %config.orders_topic,
        dlq_topic = %config.dlq_topic,
        http_port = config.http_port,
        "🚀 Starting order fulfillment service"
    );

    let metrics = Arc::new(Metrics::new()?);

    // Creation side
    let store: Arc<dyn OrderStore> = Arc::new(InMemoryOrderStore::new());
    let publisher: Arc<dyn EventPublisher> = Arc::new(KafkaEventPublisher::new(
        &config.kafka_brokers,
        config.orders_topic.clone(),
        config.publish_timeout,
        config.publish_retry.clone(),
        metrics.clone(),
    )?);
    let manager = Arc::new(OrderLifecycleManager::new(
        store,
        publisher,
        metrics.clone(),
    ));

    // Fulfillment side
    let ledger: Arc<dyn IdempotencyLedger> = Arc::new(InMemoryIdempotencyLedger::new());
    let gateway: Arc<dyn ShippingGateway> =
        Arc::new(SimulatedShippingGateway::new(config.shipping.clone()));
    let orchestrator = Arc::new(FulfillmentOrchestrator::new(
        manager.clone(),
        ledger,
        gateway,
        config.shipping.max_retry_window(),
        metrics.clone(),
    ));
    let dlq = DeadLetterQueue::new(
        &config.kafka_brokers,
        config.dlq_topic.clone(),
        config.publish_timeout,
        metrics.clone(),
    )?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = FulfillmentWorker::new(
        &config.kafka_brokers,
        &config.consumer_group,
        &config.orders_topic,
        orchestrator,
        dlq,
        shutdown_rx,
        config.max_dispatch_failures,
        metrics.clone(),
    )?;
    let worker_handle = tokio::spawn(worker.run());

    // Blocks until the server receives SIGINT / SIGTERM
    api::run_http_server(manager, metrics, config.http_port).await?;

    tracing::info!("HTTP server stopped, draining fulfillment worker");
    let _ = shutdown_tx.send(true);
    worker_handle.await??;

    tracing::info!("✅ Shutdown complete");
    Ok(())
}
