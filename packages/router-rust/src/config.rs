use std::sync::Arc;
use std::time::Duration;

use switchyard_core::{ServiceType, TrialRegistration};

/// Router-level defaults consulted by decorator factories.
///
/// Factories configured explicitly ignore these; the values only fill in what
/// a factory was not told.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Label for this router in logs.
    pub name: String,
    /// Per-attempt timeout used by `TimeoutFactory` without an explicit duration.
    pub default_attempt_timeout_ms: u64,
    /// Concurrency limit used by `ConcurrencyLimitFactory` without an explicit limit.
    pub max_concurrent_invocations: u32,
    /// Circuit breaker settings used by `CircuitBreakerFactory::default()`.
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            name: "switchyard".to_string(),
            default_attempt_timeout_ms: 30_000,
            max_concurrent_invocations: 1000,
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// Configuration for the circuit breaker decorator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures of one key that open its circuit.
    pub failure_threshold: u32,
    /// How long an open circuit rejects calls before letting a probe through.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Context handed to decorator factories when a proxy is built.
#[derive(Debug, Clone)]
pub struct ServiceContext {
    pub config: Arc<RouterConfig>,
    pub registration: Arc<TrialRegistration>,
}

impl ServiceContext {
    #[must_use]
    pub fn service_type(&self) -> &ServiceType {
        self.registration.service_type()
    }
}
