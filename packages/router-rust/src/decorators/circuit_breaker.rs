//! Per-key circuit breaker.
//!
//! Each trial key gets its own breaker. A key that fails `failure_threshold`
//! times in a row opens its circuit; while open, attempts against it are
//! rejected with `RoutingError::CircuitOpen` without reaching the
//! implementation, which lets the fallback policy move on to another key. Once
//! `reset_timeout` has elapsed a single probe is let through: success closes
//! the circuit, failure re-opens it.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use switchyard_core::{InvocationFailure, RoutingError};
use tokio::time::Instant;

use crate::config::{CircuitBreakerConfig, ServiceContext};
use crate::pipeline::{Decorator, DecoratorFactory, Invocation, InvocationResult, Next};

const CLOSED: u8 = 0;
const OPEN: u8 = 1;
const HALF_OPEN: u8 = 2;

/// Observable state of one key's breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

// ---------------------------------------------------------------------------
// CircuitBreakerFactory
// ---------------------------------------------------------------------------

/// Registers a [`CircuitBreakerDecorator`].
///
/// Without explicit settings the router's `circuit_breaker` config applies.
#[derive(Debug, Clone, Default)]
pub struct CircuitBreakerFactory {
    config: Option<CircuitBreakerConfig>,
}

impl CircuitBreakerFactory {
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self { config: Some(config) }
    }
}

impl DecoratorFactory for CircuitBreakerFactory {
    fn create(&self, ctx: &ServiceContext) -> Arc<dyn Decorator> {
        let config = self
            .config
            .clone()
            .unwrap_or_else(|| ctx.config.circuit_breaker.clone());
        Arc::new(CircuitBreakerDecorator::new(config))
    }
}

// ---------------------------------------------------------------------------
// Breaker state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Breaker {
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    /// Milliseconds since the decorator's origin at which the circuit last opened.
    opened_at_ms: AtomicU64,
    probe_in_flight: AtomicBool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe,
}

impl Breaker {
    fn state(&self) -> CircuitState {
        match self.state.load(Ordering::Acquire) {
            OPEN => CircuitState::Open,
            HALF_OPEN => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    fn admit(&self, now_ms: u64, reset_ms: u64) -> Option<Admission> {
        match self.state.load(Ordering::Acquire) {
            CLOSED => Some(Admission::Normal),
            OPEN => {
                if now_ms.saturating_sub(self.opened_at_ms.load(Ordering::Acquire)) < reset_ms {
                    return None;
                }
                // Losing this race means another call already moved the breaker on.
                let _ = self
                    .state
                    .compare_exchange(OPEN, HALF_OPEN, Ordering::AcqRel, Ordering::Acquire);
                self.try_probe()
            }
            _ => self.try_probe(),
        }
    }

    fn try_probe(&self) -> Option<Admission> {
        if self.state.load(Ordering::Acquire) != HALF_OPEN {
            return None;
        }
        self.probe_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Admission::Probe)
    }

    fn on_success(&self, admission: Admission) {
        self.consecutive_failures.store(0, Ordering::Release);
        self.state.store(CLOSED, Ordering::Release);
        if admission == Admission::Probe {
            self.probe_in_flight.store(false, Ordering::Release);
        }
    }

    fn on_failure(&self, admission: Admission, now_ms: u64, threshold: u32) -> bool {
        match admission {
            Admission::Probe => {
                self.open(now_ms);
                self.probe_in_flight.store(false, Ordering::Release);
                true
            }
            Admission::Normal => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= threshold && self.state.load(Ordering::Acquire) == CLOSED {
                    self.open(now_ms);
                    return true;
                }
                false
            }
        }
    }

    fn on_ignored(&self, admission: Admission) {
        if admission == Admission::Probe {
            self.probe_in_flight.store(false, Ordering::Release);
        }
    }

    fn open(&self, now_ms: u64) {
        self.opened_at_ms.store(now_ms, Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Release);
        self.state.store(OPEN, Ordering::Release);
    }
}

/// An admitted attempt whose outcome has not been recorded yet.
///
/// Dropping it unsettled, as happens when an outer deadline or the caller
/// abandons the attempt, counts as ignored so a probe slot is never leaked.
struct AdmissionGuard {
    breaker: Arc<Breaker>,
    admission: Admission,
    settled: bool,
}

impl AdmissionGuard {
    fn new(breaker: Arc<Breaker>, admission: Admission) -> Self {
        Self {
            breaker,
            admission,
            settled: false,
        }
    }

    fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.admission);
    }

    fn failure(mut self, now_ms: u64, threshold: u32) -> bool {
        self.settled = true;
        self.breaker.on_failure(self.admission, now_ms, threshold)
    }

    fn ignored(mut self) {
        self.settled = true;
        self.breaker.on_ignored(self.admission);
    }
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_ignored(self.admission);
        }
    }
}

// ---------------------------------------------------------------------------
// CircuitBreakerDecorator
// ---------------------------------------------------------------------------

/// Rejects attempts against keys whose circuit is open.
///
/// Cancelled attempts are neither successes nor failures.
#[derive(Debug)]
pub struct CircuitBreakerDecorator {
    config: CircuitBreakerConfig,
    origin: Instant,
    breakers: DashMap<String, Arc<Breaker>>,
}

impl CircuitBreakerDecorator {
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            origin: Instant::now(),
            breakers: DashMap::new(),
        }
    }

    /// Current state for `key`; keys never seen are closed.
    #[must_use]
    pub fn state(&self, key: &str) -> CircuitState {
        self.breakers
            .get(key)
            .map_or(CircuitState::Closed, |breaker| breaker.state())
    }

    fn breaker(&self, key: &str) -> Arc<Breaker> {
        if let Some(existing) = self.breakers.get(key) {
            return existing.clone();
        }
        self.breakers.entry(key.to_string()).or_default().clone()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn reset_ms(&self) -> u64 {
        duration_ms(self.config.reset_timeout)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

#[async_trait]
impl Decorator for CircuitBreakerDecorator {
    async fn invoke(&self, invocation: Invocation, next: Next) -> InvocationResult {
        let ctx = invocation.context();
        let key = ctx.attempt_key.clone();
        let service_type = ctx.service_type.to_string();
        let breaker = self.breaker(&key);

        let Some(admission) = breaker.admit(self.now_ms(), self.reset_ms()) else {
            tracing::debug!(service = %service_type, key = %key, "circuit open, attempt rejected");
            return Err(RoutingError::CircuitOpen { service_type, key }.into());
        };

        let admitted = AdmissionGuard::new(breaker, admission);
        let result = next.run(invocation).await;
        match &result {
            Ok(_) => admitted.success(),
            Err(InvocationFailure::Routing(RoutingError::Cancelled)) => admitted.ignored(),
            Err(_) => {
                if admitted.failure(self.now_ms(), self.config.failure_threshold) {
                    tracing::warn!(
                        service = %service_type,
                        key = %key,
                        reset_timeout_ms = self.reset_ms(),
                        "circuit opened"
                    );
                }
            }
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
