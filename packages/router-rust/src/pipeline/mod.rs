//! Decorator pipeline: ordered cross-cutting behaviors around the terminal call.
//!
//! - [`Invocation`]: one attempt travelling through the chain, carrying its
//!   context, cancellation token, and the terminal call
//! - [`Decorator`]: the `invoke(invocation, next)` contract
//! - [`layer`]: adapts decorators into Tower layers and services
//! - [`DecoratorPipeline`]: folds the decorators into a single service at
//!   construction time
//!
//! Values and implementation errors are type-erased inside the pipeline so one
//! composed service handles every method of a routed interface.

pub mod builder;
pub mod layer;

pub use builder::DecoratorPipeline;
pub use layer::{DecoratorLayer, DecoratorService, TerminalService};

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use switchyard_core::{InvocationContext, InvocationFailure};
use tokio_util::sync::CancellationToken;
use tower::util::BoxCloneSyncService;
use tower::ServiceExt;

use crate::config::ServiceContext;

/// Result value of a successful attempt, downcast by the proxy at the boundary.
pub type ErasedValue = Box<dyn Any + Send>;

/// Outcome of one attempt.
pub type InvocationResult = Result<ErasedValue, InvocationFailure>;

/// Boxed future produced by every stage of the pipeline.
pub type BoxedFuture = Pin<Box<dyn Future<Output = InvocationResult> + Send>>;

/// The composed chain as a type-erased Tower service.
pub type PipelineService = BoxCloneSyncService<Invocation, ErasedValue, InvocationFailure>;

type TerminalFn = Box<dyn FnOnce(CancellationToken) -> BoxedFuture + Send>;

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// One attempt travelling through the decorator chain.
pub struct Invocation {
    context: InvocationContext,
    cancellation: CancellationToken,
    terminal: TerminalFn,
}

impl Invocation {
    /// Creates an invocation whose terminal call is produced by `terminal`.
    ///
    /// The terminal receives the cancellation token that is current when the
    /// chain reaches it, so tokens derived by decorators are visible to it.
    pub fn new<F>(context: InvocationContext, cancellation: CancellationToken, terminal: F) -> Self
    where
        F: FnOnce(CancellationToken) -> BoxedFuture + Send + 'static,
    {
        Self {
            context,
            cancellation,
            terminal: Box::new(terminal),
        }
    }

    /// Creates an invocation around a synchronous terminal, lifted into a ready future.
    pub fn from_sync<F>(context: InvocationContext, cancellation: CancellationToken, terminal: F) -> Self
    where
        F: FnOnce() -> InvocationResult + Send + 'static,
    {
        Self::new(context, cancellation, move |_token| {
            Box::pin(std::future::ready(terminal())) as BoxedFuture
        })
    }

    #[must_use]
    pub fn context(&self) -> &InvocationContext {
        &self.context
    }

    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Replaces the cancellation token seen by the rest of the chain.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub(crate) fn into_terminal(self) -> (CancellationToken, TerminalFn) {
        (self.cancellation, self.terminal)
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("context", &self.context)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Decorator contract
// ---------------------------------------------------------------------------

/// Continuation handed to a decorator: the rest of the chain.
pub struct Next {
    inner: PipelineService,
}

impl Next {
    pub(crate) fn new(inner: PipelineService) -> Self {
        Self { inner }
    }

    /// Runs the rest of the chain. Dropping `Next` without calling this
    /// short-circuits the call.
    pub async fn run(self, invocation: Invocation) -> InvocationResult {
        self.inner.oneshot(invocation).await
    }
}

/// Cross-cutting behavior wrapped around the terminal call.
///
/// One decorator instance serves every call of its proxy concurrently; state
/// shared across calls must be synchronized by the decorator itself.
#[async_trait]
pub trait Decorator: Send + Sync {
    async fn invoke(&self, invocation: Invocation, next: Next) -> InvocationResult;
}

/// Builds a decorator once per proxy.
pub trait DecoratorFactory: Send + Sync {
    fn create(&self, ctx: &ServiceContext) -> Arc<dyn Decorator>;
}

/// Adapts a closure into a [`DecoratorFactory`].
pub struct FactoryFn<F>(F);

/// Wraps `f` so it can be registered as a decorator factory.
pub fn factory_fn<F>(f: F) -> FactoryFn<F>
where
    F: Fn(&ServiceContext) -> Arc<dyn Decorator> + Send + Sync,
{
    FactoryFn(f)
}

impl<F> DecoratorFactory for FactoryFn<F>
where
    F: Fn(&ServiceContext) -> Arc<dyn Decorator> + Send + Sync,
{
    fn create(&self, ctx: &ServiceContext) -> Arc<dyn Decorator> {
        (self.0)(ctx)
    }
}
