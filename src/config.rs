use std::time::Duration;

use anyhow::{bail, Context};

use crate::fulfillment::ShippingConfig;
use crate::utils::RetryConfig;

// ============================================================================
// Configuration
// ============================================================================
//
// Everything comes from the environment, with workable local-dev defaults.
// A `.env` file is loaded at startup when present.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct Config {
    pub http_port: u16,
    pub kafka_brokers: String,
    pub orders_topic: String,
    pub dlq_topic: String,
    pub consumer_group: String,
    pub publish_timeout: Duration,
    pub publish_retry: RetryConfig,
    /// Consecutive dispatch failures before a message is dead-lettered
    pub max_dispatch_failures: u32,
    pub shipping: ShippingConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            http_port: env_parse("HTTP_PORT", 8080)?,
            kafka_brokers: env_or("KAFKA_BROKERS", "127.0.0.1:9092"),
            orders_topic: env_or("ORDERS_TOPIC", "orders.created"),
            dlq_topic: env_or("DLQ_TOPIC", "orders.created.dlq"),
            consumer_group: env_or("CONSUMER_GROUP", "fulfillment-workers"),
            publish_timeout: Duration::from_millis(env_parse("PUBLISH_TIMEOUT_MS", 5_000u64)?),
            publish_retry: RetryConfig {
                max_attempts: env_parse("PUBLISH_MAX_ATTEMPTS", 3u32)?,
                initial_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(2),
                multiplier: 2.0,
            },
            max_dispatch_failures: env_parse("MAX_DISPATCH_FAILURES", 5u32)?,
            shipping: ShippingConfig {
                attempt_timeout: Duration::from_millis(env_parse(
                    "SHIPPING_TIMEOUT_MS",
                    10_000u64,
                )?),
                retry: RetryConfig {
                    max_attempts: env_parse("SHIPPING_MAX_ATTEMPTS", 3u32)?,
                    initial_delay: Duration::from_millis(500),
                    max_delay: Duration::from_secs(5),
                    multiplier: 2.0,
                },
                latency_min: Duration::from_millis(env_parse("SHIPPING_LATENCY_MIN_MS", 100u64)?),
                latency_max: Duration::from_millis(env_parse("SHIPPING_LATENCY_MAX_MS", 800u64)?),
                failure_rate: env_parse("SHIPPING_FAILURE_RATE", 0.2f64)?,
            },
        };

        if !(0.0..=1.0).contains(&config.shipping.failure_rate) {
            bail!(
                "SHIPPING_FAILURE_RATE must be in [0.0, 1.0], got {}",
                config.shipping.failure_rate
            );
        }
        if config.shipping.latency_min > config.shipping.latency_max {
            bail!("SHIPPING_LATENCY_MIN_MS must not exceed SHIPPING_LATENCY_MAX_MS");
        }
        if config.max_dispatch_failures == 0 {
            bail!("MAX_DISPATCH_FAILURES must be at least 1");
        }

        Ok(config)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_present_variable() {
        std::env::set_var("TEST_CFG_PORT", "9999");
        let port: u16 = env_parse("TEST_CFG_PORT", 8080).unwrap();
        assert_eq!(port, 9999);
        std::env::remove_var("TEST_CFG_PORT");
    }

    #[test]
    fn falls_back_to_default_when_unset() {
        std::env::remove_var("TEST_CFG_MISSING");
        let port: u16 = env_parse("TEST_CFG_MISSING", 8080).unwrap();
        assert_eq!(port, 8080);
        assert_eq!(env_or("TEST_CFG_MISSING", "fallback"), "fallback");
    }

    #[test]
    fn rejects_garbage_values() {
        std::env::set_var("TEST_CFG_GARBAGE", "not-a-number");
        let result: anyhow::Result<u16> = env_parse("TEST_CFG_GARBAGE", 8080);
        assert!(result.is_err());
        std::env::remove_var("TEST_CFG_GARBAGE");
    }
}
