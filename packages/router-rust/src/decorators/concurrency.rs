//! Load-shedding decorator.
//!
//! Rejects attempts with `RoutingError::Overloaded` when the proxy already has
//! `limit` attempts in flight.

use std::sync::Arc;

use async_trait::async_trait;
use switchyard_core::RoutingError;
use tokio::sync::Semaphore;

use crate::config::ServiceContext;
use crate::pipeline::{Decorator, DecoratorFactory, Invocation, InvocationResult, Next};

/// Registers a [`ConcurrencyLimitDecorator`].
///
/// Without an explicit limit the router's `max_concurrent_invocations` applies.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcurrencyLimitFactory {
    limit: Option<u32>,
}

impl ConcurrencyLimitFactory {
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self { limit: Some(limit) }
    }
}

impl DecoratorFactory for ConcurrencyLimitFactory {
    fn create(&self, ctx: &ServiceContext) -> Arc<dyn Decorator> {
        let limit = self.limit.unwrap_or(ctx.config.max_concurrent_invocations);
        Arc::new(ConcurrencyLimitDecorator::new(limit))
    }
}

/// Limits concurrent attempts via a semaphore shared by every call of the proxy.
///
/// When all permits are taken, attempts are rejected immediately rather than queued.
#[derive(Debug)]
pub struct ConcurrencyLimitDecorator {
    semaphore: Arc<Semaphore>,
}

impl ConcurrencyLimitDecorator {
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit as usize)),
        }
    }

    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[async_trait]
impl Decorator for ConcurrencyLimitDecorator {
    async fn invoke(&self, invocation: Invocation, next: Next) -> InvocationResult {
        let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
            tracing::debug!(
                service = %invocation.context().service_type,
                key = %invocation.context().attempt_key,
                "concurrency limit reached, attempt rejected"
            );
            return Err(RoutingError::Overloaded.into());
        };

        // Held for the duration of the attempt.
        let result = next.run(invocation).await;
        drop(permit);
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
