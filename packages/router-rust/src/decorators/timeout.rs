//! Per-attempt timeout decorator.
//!
//! Fails attempts that exceed their deadline with `RoutingError::Timeout`. The
//! rest of the chain sees a child cancellation token that is cancelled when the
//! deadline passes, so cooperative implementations can stop early.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use switchyard_core::RoutingError;

use crate::config::ServiceContext;
use crate::pipeline::{Decorator, DecoratorFactory, Invocation, InvocationResult, Next};

// ---------------------------------------------------------------------------
// TimeoutFactory
// ---------------------------------------------------------------------------

/// Registers a [`TimeoutDecorator`].
///
/// Without an explicit duration the router's `default_attempt_timeout_ms` applies.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeoutFactory {
    timeout: Option<Duration>,
}

impl TimeoutFactory {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

impl DecoratorFactory for TimeoutFactory {
    fn create(&self, ctx: &ServiceContext) -> Arc<dyn Decorator> {
        let timeout = self
            .timeout
            .unwrap_or_else(|| Duration::from_millis(ctx.config.default_attempt_timeout_ms));
        Arc::new(TimeoutDecorator::new(timeout))
    }
}

// ---------------------------------------------------------------------------
// TimeoutDecorator
// ---------------------------------------------------------------------------

/// Bounds every attempt passing through it by a fixed duration.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutDecorator {
    timeout: Duration,
}

impl TimeoutDecorator {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Decorator for TimeoutDecorator {
    async fn invoke(&self, invocation: Invocation, next: Next) -> InvocationResult {
        let key = invocation.context().attempt_key.clone();
        let deadline_token = invocation.cancellation().child_token();
        let invocation = invocation.with_cancellation(deadline_token.clone());

        match tokio::time::timeout(self.timeout, next.run(invocation)).await {
            Ok(result) => result,
            Err(_elapsed) => {
                deadline_token.cancel();
                #[allow(clippy::cast_possible_truncation)]
                let timeout_ms = self.timeout.as_millis() as u64;
                tracing::debug!(key = %key, timeout_ms, "attempt deadline exceeded");
                Err(RoutingError::Timeout { key, timeout_ms }.into())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
