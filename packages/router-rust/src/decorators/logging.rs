//! Logging decorator.
//!
//! Records attempt duration and outcome using `tracing` spans. Counter-style
//! metrics live in the telemetry adapters instead.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{info_span, Instrument};

use crate::config::ServiceContext;
use crate::pipeline::{Decorator, DecoratorFactory, Invocation, InvocationResult, Next};

/// Registers a [`LoggingDecorator`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingFactory;

impl DecoratorFactory for LoggingFactory {
    fn create(&self, ctx: &ServiceContext) -> Arc<dyn Decorator> {
        Arc::new(LoggingDecorator {
            router: ctx.config.name.clone(),
        })
    }
}

/// Wraps each attempt in an `attempt` span and logs its outcome.
#[derive(Debug, Clone)]
pub struct LoggingDecorator {
    router: String,
}

impl LoggingDecorator {
    #[must_use]
    pub fn new(router: impl Into<String>) -> Self {
        Self { router: router.into() }
    }
}

#[async_trait]
impl Decorator for LoggingDecorator {
    async fn invoke(&self, invocation: Invocation, next: Next) -> InvocationResult {
        let ctx = invocation.context();
        let service = ctx.service_type.to_string();
        let method = ctx.method_name;
        let key = ctx.attempt_key.clone();
        let attempt = ctx.attempt;

        let span = info_span!(
            "attempt",
            router = %self.router,
            invocation_id = %ctx.invocation_id,
            service = %service,
            method = method,
            key = %key,
            attempt = attempt,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        async move {
            let start = Instant::now();
            let result = next.run(invocation).await;

            #[allow(clippy::cast_possible_truncation)]
            let duration_ms = start.elapsed().as_millis() as u64;
            let outcome = match &result {
                Ok(_) => "ok",
                Err(failure) => failure.kind(),
            };
            tracing::Span::current().record("duration_ms", duration_ms);
            tracing::Span::current().record("outcome", outcome);

            match &result {
                Ok(_) => tracing::info!(
                    service = %service,
                    method = method,
                    key = %key,
                    duration_ms = duration_ms,
                    "attempt complete"
                ),
                Err(failure) => tracing::warn!(
                    service = %service,
                    method = method,
                    key = %key,
                    duration_ms = duration_ms,
                    outcome = outcome,
                    error = %failure,
                    "attempt failed"
                ),
            }

            result
        }
        .instrument(span)
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
