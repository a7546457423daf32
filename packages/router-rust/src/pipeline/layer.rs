//! Tower adapters for decorators and the terminal call.

use std::sync::Arc;
use std::task::{Context, Poll};

use switchyard_core::{InvocationFailure, RoutingError};
use tower::{Layer, Service};

use super::{BoxedFuture, Decorator, ErasedValue, Invocation, Next, PipelineService};

// ---------------------------------------------------------------------------
// TerminalService
// ---------------------------------------------------------------------------

/// Innermost service: runs the invocation's terminal call.
///
/// The call races the invocation's cancellation token; a token cancelled
/// before the call starts means the implementation is never touched.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalService;

impl Service<Invocation> for TerminalService {
    type Response = ErasedValue;
    type Error = InvocationFailure;
    type Future = BoxedFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, invocation: Invocation) -> Self::Future {
        let (cancellation, terminal) = invocation.into_terminal();
        Box::pin(async move {
            if cancellation.is_cancelled() {
                return Err(InvocationFailure::from(RoutingError::Cancelled));
            }
            let call = terminal(cancellation.clone());
            tokio::select! {
                biased;
                () = cancellation.cancelled() => Err(InvocationFailure::from(RoutingError::Cancelled)),
                result = call => result,
            }
        })
    }
}

// ---------------------------------------------------------------------------
// DecoratorLayer
// ---------------------------------------------------------------------------

/// Tower layer that wraps the rest of the chain with one decorator.
#[derive(Clone)]
pub struct DecoratorLayer {
    decorator: Arc<dyn Decorator>,
}

impl DecoratorLayer {
    #[must_use]
    pub fn new(decorator: Arc<dyn Decorator>) -> Self {
        Self { decorator }
    }
}

impl Layer<PipelineService> for DecoratorLayer {
    type Service = DecoratorService;

    fn layer(&self, inner: PipelineService) -> Self::Service {
        DecoratorService {
            decorator: self.decorator.clone(),
            inner,
        }
    }
}

// ---------------------------------------------------------------------------
// DecoratorService
// ---------------------------------------------------------------------------

/// Service wrapper that hands each invocation to its decorator together with
/// the rest of the chain as [`Next`].
#[derive(Clone)]
pub struct DecoratorService {
    decorator: Arc<dyn Decorator>,
    inner: PipelineService,
}

impl Service<Invocation> for DecoratorService {
    type Response = ErasedValue;
    type Error = InvocationFailure;
    type Future = BoxedFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Readiness of the inner chain is checked by `Next::run` through `oneshot`.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, invocation: Invocation) -> Self::Future {
        let decorator = self.decorator.clone();
        let next = Next::new(self.inner.clone());
        Box::pin(async move { decorator.invoke(invocation, next).await })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
