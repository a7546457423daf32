use std::sync::Arc;

use async_trait::async_trait;

use crate::context::{InvocationContext, SelectionSource};
use crate::error::{InvocationFailure, ResolveError};
use crate::types::ImplementationDescriptor;

/// Unit of resource ownership for one attempt.
///
/// Everything resolved from a scope lives until [`dispose`](Self::dispose). The
/// proxy creates one scope per attempt and disposes it exactly once, whether the
/// attempt succeeds, fails, or is cancelled.
#[async_trait]
pub trait ImplementationScope<S: ?Sized + Send + Sync + 'static>: Send {
    /// Build or look up the implementation named by `descriptor`.
    async fn resolve(&mut self, descriptor: &ImplementationDescriptor) -> Result<Arc<S>, ResolveError>;

    /// Release everything created within this scope.
    fn dispose(&mut self);
}

/// Creates per-attempt scopes for implementations of `S`.
/// Implementations: dependency-injection containers, the router's `ImplementationCatalog`.
pub trait ScopeFactory<S: ?Sized + Send + Sync + 'static>: Send + Sync {
    fn create_scope(&self) -> Box<dyn ImplementationScope<S>>;
}

/// Observability sink for one call. Owned by the proxy for the call's duration.
///
/// Every method may be a no-op; substituting a no-op scope must not change
/// routing behavior.
pub trait TelemetryScope: Send {
    /// The key chosen for the primary attempt and where it came from.
    fn record_variant(&mut self, key: &str, source: SelectionSource);

    /// A fallback attempt against `key` is about to start.
    fn record_fallback(&mut self, key: &str);

    /// An attempt against `key` failed. Reported for every failed attempt; the
    /// last one is followed by [`record_failure`](Self::record_failure).
    fn record_attempt_failure(&mut self, _key: &str, _failure: &InvocationFailure) {}

    /// The call succeeded. Called at most once.
    fn record_success(&mut self);

    /// The call failed after all permitted attempts. Called at most once.
    fn record_failure(&mut self, failure: &InvocationFailure);

    /// Flush or close the scope. Called exactly once, last.
    fn dispose(&mut self) {}
}

/// Starts telemetry scopes. Implementations: tracing, metrics, no-op.
pub trait TelemetryProvider: Send + Sync {
    fn start_invocation(&self, ctx: &InvocationContext) -> Box<dyn TelemetryScope>;
}
