use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::utils::{retry_with_backoff, RetryConfig};

// ============================================================================
// Shipping Gateway
// ============================================================================
//
// Bounded-latency call to the shipping dependency. Every attempt runs under
// a fixed timeout; transient failures are retried with exponential backoff
// up to the attempt budget. Exhausting the budget is a normal outcome: the
// gateway returns Failed, it does not raise.
//
// The simulated backend injects latency and random failures; a production
// gateway replaces the body behind the same trait.
//
// ============================================================================

pub const CARRIERS: [&str; 4] = ["UPS", "FedEx", "DHL", "USPS"];

/// Outcome of a shipping request. The enum keeps the success and failure
/// fields mutually exclusive by construction.
#[derive(Debug, Clone, PartialEq)]
pub enum ShippingResult {
    Shipped {
        tracking_number: String,
        carrier: String,
        shipped_at: DateTime<Utc>,
    },
    Failed {
        error_message: String,
    },
}

#[async_trait]
pub trait ShippingGateway: Send + Sync {
    async fn ship(&self, order_id: Uuid, correlation_id: Uuid) -> ShippingResult;
}

#[derive(Clone, Debug)]
pub struct ShippingConfig {
    /// Per-attempt deadline
    pub attempt_timeout: Duration,
    pub retry: RetryConfig,
    /// Simulated latency range
    pub latency_min: Duration,
    pub latency_max: Duration,
    /// Fraction of simulated calls that fail, in [0.0, 1.0]
    pub failure_rate: f64,
}

impl Default for ShippingConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(10),
            retry: RetryConfig {
                max_attempts: 3,
                initial_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(5),
                multiplier: 2.0,
            },
            latency_min: Duration::from_millis(100),
            latency_max: Duration::from_millis(800),
            failure_rate: 0.2,
        }
    }
}

impl ShippingConfig {
    /// Worst-case wall-clock time one event can spend inside the gateway.
    /// The orchestrator uses this as the staleness window for abandoned
    /// Processing claims.
    pub fn max_retry_window(&self) -> Duration {
        self.attempt_timeout * self.retry.max_attempts + self.retry.total_backoff()
    }
}

// ============================================================================
// Simulated Backend
// ============================================================================

pub struct SimulatedShippingGateway {
    config: ShippingConfig,
}

impl SimulatedShippingGateway {
    pub fn new(config: ShippingConfig) -> Self {
        Self { config }
    }

    async fn attempt(&self, order_id: Uuid) -> Result<(String, String), String> {
        // Draw everything before the first await; ThreadRng is not Send.
        let (latency_ms, roll, tracking_suffix, carrier_index) = {
            let mut rng = rand::thread_rng();
            let min_ms = self.config.latency_min.as_millis() as u64;
            let max_ms = self.config.latency_max.as_millis() as u64;
            (
                rng.gen_range(min_ms..=max_ms),
                rng.gen::<f64>(),
                rng.gen_range(0u64..=9_999_999_999),
                rng.gen_range(0..CARRIERS.len()),
            )
        };

        tokio::time::sleep(Duration::from_millis(latency_ms)).await;

        if roll < self.config.failure_rate {
            return Err(format!("carrier rejected shipment for order {order_id}"));
        }

        Ok((
            format!("TRK-{tracking_suffix:010}"),
            CARRIERS[carrier_index].to_string(),
        ))
    }
}

#[async_trait]
impl ShippingGateway for SimulatedShippingGateway {
    async fn ship(&self, order_id: Uuid, correlation_id: Uuid) -> ShippingResult {
        let outcome = retry_with_backoff(&self.config.retry, "shipping", |attempt| async move {
            tracing::debug!(
                order_id = %order_id,
                correlation_id = %correlation_id,
                attempt = attempt,
                "Calling shipping dependency"
            );
            match tokio::time::timeout(self.config.attempt_timeout, self.attempt(order_id)).await
            {
                Ok(result) => result,
                Err(_) => Err(format!(
                    "shipping call timed out after {:?}",
                    self.config.attempt_timeout
                )),
            }
        })
        .await;

        match outcome {
            Ok((tracking_number, carrier)) => {
                tracing::info!(
                    order_id = %order_id,
                    correlation_id = %correlation_id,
                    tracking_number = %tracking_number,
                    carrier = %carrier,
                    "Shipment booked"
                );
                ShippingResult::Shipped {
                    tracking_number,
                    carrier,
                    shipped_at: Utc::now(),
                }
            }
            Err(error) => {
                tracing::warn!(
                    order_id = %order_id,
                    correlation_id = %correlation_id,
                    error = %error,
                    "Shipping failed after all attempts"
                );
                ShippingResult::Failed {
                    error_message: format!(
                        "shipping failed after {} attempt(s): {error}",
                        self.config.retry.max_attempts
                    ),
                }
            }
        }
    }
}
