use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

// ============================================================================
// Circuit Breaker
// ============================================================================
//
// Protects the broker publish path: after a run of failures the circuit
// opens and publish attempts fail fast instead of piling up on a dead
// broker. After a cool-down the circuit half-opens and a limited number of
// probe calls decide whether it closes again.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation
    Closed,
    /// Failing fast, no calls pass through
    Open,
    /// Probing for recovery
    HalfOpen,
}

#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// Cool-down before an open circuit allows a probe call
    pub cooldown: Duration,
    /// Successful probes required to close a half-open circuit
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    probe_successes: u32,
    opened_at: Option<Instant>,
}

#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<Mutex<BreakerState>>,
    config: CircuitBreakerConfig,
}

#[derive(Debug)]
pub enum CircuitBreakerError<E> {
    /// Call was rejected without being attempted
    CircuitOpen,
    /// Call was attempted and failed
    OperationFailed(E),
}

impl<E: std::fmt::Display> std::fmt::Display for CircuitBreakerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitBreakerError::CircuitOpen => write!(f, "Circuit breaker is open"),
            CircuitBreakerError::OperationFailed(e) => write!(f, "Operation failed: {}", e),
        }
    }
}

impl<E: std::error::Error> std::error::Error for CircuitBreakerError<E> {}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                probe_successes: 0,
                opened_at: None,
            })),
            config,
        }
    }

    /// Run `operation` if the circuit permits it, recording the outcome.
    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        {
            let mut guard = self.inner.lock().await;
            if guard.state == CircuitState::Open {
                let cooled_down = guard
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.config.cooldown);
                if !cooled_down {
                    return Err(CircuitBreakerError::CircuitOpen);
                }
                tracing::info!("Circuit breaker half-open, allowing probe call");
                guard.state = CircuitState::HalfOpen;
                guard.probe_successes = 0;
            }
        }

        match operation.await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(error) => {
                self.on_failure().await;
                Err(CircuitBreakerError::OperationFailed(error))
            }
        }
    }

    async fn on_success(&self) {
        let mut guard = self.inner.lock().await;
        match guard.state {
            CircuitState::Closed => guard.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                guard.probe_successes += 1;
                if guard.probe_successes >= self.config.success_threshold {
                    tracing::info!(
                        probes = guard.probe_successes,
                        "Circuit breaker closing after successful probes"
                    );
                    guard.state = CircuitState::Closed;
                    guard.consecutive_failures = 0;
                    guard.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    async fn on_failure(&self) {
        let mut guard = self.inner.lock().await;
        guard.consecutive_failures += 1;
        match guard.state {
            CircuitState::Closed if guard.consecutive_failures >= self.config.failure_threshold => {
                tracing::warn!(
                    failures = guard.consecutive_failures,
                    "Circuit breaker opening"
                );
                guard.state = CircuitState::Open;
                guard.opened_at = Some(Instant::now());
            }
            CircuitState::HalfOpen => {
                tracing::warn!("Probe call failed, circuit breaker reopening");
                guard.state = CircuitState::Open;
                guard.opened_at = Some(Instant::now());
            }
            _ => {}
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }
}
