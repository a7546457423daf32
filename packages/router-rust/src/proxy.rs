//! The invocation proxy: routes each call of an interface to one of several
//! implementations.
//!
//! Per call:
//! 1. A caller token that is already cancelled ends the call before anything runs.
//! 2. The activation gate decides whether the trial is live.
//! 3. The selection mode picks a key, or the default key is used.
//! 4. Each attempt opens a fresh scope, resolves the key's implementation, and
//!    runs the decorator pipeline around the method call. The scope is disposed
//!    exactly once, also when the attempt is cancelled by drop.
//! 5. Failures drive the [`FallbackMachine`]; a trial deadline bounds the
//!    attempts it covers and hands expiry to the timeout action.
//! 6. The erased result is restored to the method's own `T` and `E`.

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use switchyard_core::{
    ClockSource, InvocationContext, InvocationFailure, ResolveError, RoutingError, ScopeFactory,
    SelectionModeRegistry, SystemClock, TelemetryProvider, TimeoutPolicy, TimeoutScope,
    TrialRegistration,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};

use crate::config::{RouterConfig, ServiceContext};
use crate::fallback::{AttemptState, FallbackMachine, FallbackTrigger};
use crate::gate::ActivationGate;
use crate::pipeline::{
    BoxedFuture, DecoratorFactory, DecoratorPipeline, ErasedValue, Invocation, InvocationResult,
};
use crate::scope::ScopeGuard;
use crate::selection::{self, Selection};
use crate::telemetry::{NoopTelemetry, TelemetryGuard};

/// A method call with its arguments already bound, erased over the result type.
type ErasedCall<S> = Arc<dyn Fn(Arc<S>, CancellationToken) -> BoxedFuture + Send + Sync>;

enum AttemptOutcome<'a> {
    Completed(InvocationResult),
    DeadlineExceeded(&'a TimeoutPolicy),
}

// ---------------------------------------------------------------------------
// InvocationProxy
// ---------------------------------------------------------------------------

/// Routes calls against implementations of `S` according to one trial registration.
///
/// The proxy is immutable once built and is shared across concurrent calls;
/// cloning it is cheap.
pub struct InvocationProxy<S: ?Sized + Send + Sync + 'static> {
    registration: Arc<TrialRegistration>,
    selection_modes: Arc<SelectionModeRegistry>,
    scopes: Arc<dyn ScopeFactory<S>>,
    pipeline: DecoratorPipeline,
    telemetry: Arc<dyn TelemetryProvider>,
    gate: ActivationGate,
}

impl<S: ?Sized + Send + Sync + 'static> InvocationProxy<S> {
    /// Starts a proxy for `registration`.
    ///
    /// `selection_modes` resolves the registration's mode identifier and
    /// `scopes` supplies a fresh implementation scope per attempt.
    pub fn builder(
        registration: impl Into<Arc<TrialRegistration>>,
        selection_modes: Arc<SelectionModeRegistry>,
        scopes: Arc<dyn ScopeFactory<S>>,
    ) -> InvocationProxyBuilder<S> {
        InvocationProxyBuilder {
            registration: registration.into(),
            selection_modes,
            scopes,
            factories: Vec::new(),
            telemetry: Arc::new(NoopTelemetry),
            clock: Arc::new(SystemClock),
            config: Arc::new(RouterConfig::default()),
        }
    }

    #[must_use]
    pub fn registration(&self) -> &TrialRegistration {
        &self.registration
    }

    /// Number of decorators wrapped around every attempt.
    #[must_use]
    pub fn decorator_count(&self) -> usize {
        self.pipeline.depth()
    }

    /// Routes an async method call.
    ///
    /// `call` is invoked once per attempt with the implementation resolved for
    /// that attempt, so bound arguments must be cloneable into each attempt.
    ///
    /// # Errors
    ///
    /// Returns the error of the last permitted attempt: the implementation's own
    /// `E` unchanged, or a [`RoutingError`] converted through `E::from`.
    pub async fn invoke<T, E, F, Fut>(&self, method_name: &'static str, call: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: StdError + Send + Sync + From<RoutingError> + 'static,
        F: Fn(Arc<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.invoke_with_cancellation(method_name, CancellationToken::new(), move |instance, _token| {
            call(instance)
        })
        .await
    }

    /// Routes an async method call that observes cancellation.
    ///
    /// `call` receives the attempt's token, which is cancelled when the caller
    /// cancels `cancellation`, when a timeout decorator expires, or when the
    /// trial deadline passes.
    ///
    /// # Errors
    ///
    /// As [`invoke`](Self::invoke); a call cancelled by the caller fails with
    /// [`RoutingError::Cancelled`] and is not retried.
    pub async fn invoke_with_cancellation<T, E, F, Fut>(
        &self,
        method_name: &'static str,
        cancellation: CancellationToken,
        call: F,
    ) -> Result<T, E>
    where
        T: Send + 'static,
        E: StdError + Send + Sync + From<RoutingError> + 'static,
        F: Fn(Arc<S>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let erased: ErasedCall<S> = Arc::new(move |instance: Arc<S>, token: CancellationToken| -> BoxedFuture {
            let pending = call(instance, token);
            Box::pin(async move {
                pending
                    .await
                    .map(|value| Box::new(value) as ErasedValue)
                    .map_err(InvocationFailure::implementation)
            })
        });
        let value = self
            .dispatch(method_name, cancellation, erased)
            .await
            .map_err(InvocationFailure::into_caller_error::<E>)?;
        restore(value, method_name)
    }

    /// Routes a synchronous method call through the same async pipeline.
    ///
    /// The call runs when the pipeline reaches its terminal, after every
    /// decorator's pre-logic.
    ///
    /// # Errors
    ///
    /// As [`invoke`](Self::invoke).
    pub async fn invoke_sync<T, E, F>(&self, method_name: &'static str, call: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: StdError + Send + Sync + From<RoutingError> + 'static,
        F: Fn(&S) -> Result<T, E> + Send + Sync + 'static,
    {
        let erased: ErasedCall<S> = Arc::new(move |instance: Arc<S>, _token: CancellationToken| -> BoxedFuture {
            let result = call(&*instance)
                .map(|value| Box::new(value) as ErasedValue)
                .map_err(InvocationFailure::implementation);
            Box::pin(std::future::ready(result))
        });
        let value = self
            .dispatch(method_name, CancellationToken::new(), erased)
            .await
            .map_err(InvocationFailure::into_caller_error::<E>)?;
        restore(value, method_name)
    }

    async fn dispatch(
        &self,
        method_name: &'static str,
        cancellation: CancellationToken,
        call: ErasedCall<S>,
    ) -> InvocationResult {
        let registration = self.registration.as_ref();
        if cancellation.is_cancelled() {
            tracing::debug!(
                service = %registration.service_type(),
                method = method_name,
                "cancelled before dispatch"
            );
            return Err(InvocationFailure::from(RoutingError::Cancelled));
        }

        let selection = match self.gate.evaluate(registration, method_name) {
            Ok(()) => selection::select(&self.selection_modes, registration, method_name).await,
            Err(reason) => {
                tracing::debug!(
                    service = %registration.service_type(),
                    method = method_name,
                    reason = reason.as_str(),
                    "trial inactive, using default key"
                );
                Selection::inactive(registration, reason)
            }
        };

        let ctx = InvocationContext::new(
            registration.service_type().clone(),
            method_name,
            registration.selector_name(),
            selection.key.as_str(),
            Arc::clone(registration.keys()),
        );
        let span = info_span!(
            "invocation",
            invocation_id = %ctx.invocation_id,
            service = %ctx.service_type,
            method = method_name,
            key = %selection.key,
            source = %selection.source,
        );
        self.run_attempts(ctx, selection, &cancellation, &call)
            .instrument(span)
            .await
    }

    async fn run_attempts(
        &self,
        ctx: InvocationContext,
        selection: Selection,
        cancellation: &CancellationToken,
        call: &ErasedCall<S>,
    ) -> InvocationResult {
        let registration = self.registration.as_ref();
        let timeout = registration.timeout();
        // A deadline past the end of the clock's range is no deadline.
        let mut deadline =
            timeout.and_then(|policy| Instant::now().checked_add(policy.duration).map(|at| (at, policy)));

        let mut telemetry = TelemetryGuard::start(self.telemetry.as_ref(), &ctx);
        telemetry.record_variant(&selection.key, selection.source);
        let mut machine = FallbackMachine::new(selection.key);

        loop {
            let key = machine.current().to_string();
            let attempt = ctx.for_attempt(&key, machine.attempt_index());
            let outcome = self.run_attempt(attempt, call, cancellation, deadline).await;

            if timeout.is_some_and(|policy| policy.scope == TimeoutScope::FirstAttempt) {
                deadline = None;
            }

            let (result, trigger) = match outcome {
                AttemptOutcome::Completed(result) => (result, FallbackTrigger::Error(registration.on_error())),
                AttemptOutcome::DeadlineExceeded(policy) => {
                    // Attempts planned by the timeout action run unbounded.
                    deadline = None;
                    tracing::warn!(key = %key, timeout_ms = policy.duration_ms(), "trial deadline exceeded");
                    let failure = InvocationFailure::from(RoutingError::Timeout {
                        key: key.clone(),
                        timeout_ms: policy.duration_ms(),
                    });
                    (Err(failure), FallbackTrigger::Timeout(&policy.action))
                }
            };

            if result.is_err() && cancellation.is_cancelled() {
                let failure = InvocationFailure::from(RoutingError::Cancelled);
                telemetry.finish_failure(&failure);
                return Err(failure);
            }
            if let Err(failure) = &result {
                telemetry.record_attempt_failure(&key, failure);
            }

            match machine.advance(result, trigger, registration) {
                AttemptState::Succeeded(value) => {
                    telemetry.finish_success();
                    return Ok(value);
                }
                AttemptState::Exhausted(failure) => {
                    tracing::debug!(
                        attempts = machine.attempted().len(),
                        kind = failure.kind(),
                        "fallbacks exhausted"
                    );
                    telemetry.finish_failure(&failure);
                    return Err(failure);
                }
                AttemptState::Attempting(next) => {
                    tracing::warn!(from = %key, to = %next, "falling back");
                    telemetry.record_fallback(&next);
                }
            }
        }
    }

    async fn run_attempt<'a>(
        &self,
        ctx: InvocationContext,
        call: &ErasedCall<S>,
        cancellation: &CancellationToken,
        deadline: Option<(Instant, &'a TimeoutPolicy)>,
    ) -> AttemptOutcome<'a> {
        let token = cancellation.child_token();
        let attempt = async {
            tokio::select! {
                biased;
                () = token.cancelled() => Err(InvocationFailure::from(RoutingError::Cancelled)),
                result = self.attempt(ctx, Arc::clone(call), token.clone()) => result,
            }
        };

        let Some((at, policy)) = deadline else {
            return AttemptOutcome::Completed(attempt.await);
        };
        match tokio::time::timeout_at(at, attempt).await {
            Ok(result) => AttemptOutcome::Completed(result),
            Err(_elapsed) => {
                token.cancel();
                AttemptOutcome::DeadlineExceeded(policy)
            }
        }
    }

    async fn attempt(
        &self,
        ctx: InvocationContext,
        call: ErasedCall<S>,
        token: CancellationToken,
    ) -> InvocationResult {
        let Some(descriptor) = self.registration.descriptor(&ctx.attempt_key) else {
            let source = ResolveError::Unregistered {
                implementation: ctx.attempt_key.clone(),
            };
            return Err(RoutingError::Resolution {
                key: ctx.attempt_key,
                source,
            }
            .into());
        };

        let mut scope = ScopeGuard::open(self.scopes.as_ref());
        let instance = match scope.resolve(descriptor).await {
            Ok(instance) => instance,
            Err(source) => {
                tracing::warn!(key = %ctx.attempt_key, error = %source, "implementation resolution failed");
                return Err(RoutingError::Resolution {
                    key: ctx.attempt_key,
                    source,
                }
                .into());
            }
        };

        let invocation = Invocation::new(ctx, token, move |token| call(instance, token));
        let result = self.pipeline.execute(invocation).await;
        scope.dispose();
        result
    }
}

fn restore<T, E>(value: ErasedValue, method_name: &'static str) -> Result<T, E>
where
    T: 'static,
    E: From<RoutingError>,
{
    value.downcast::<T>().map(|value| *value).map_err(|_| {
        E::from(RoutingError::ResultShape {
            method: method_name.to_string(),
        })
    })
}

impl<S: ?Sized + Send + Sync + 'static> Clone for InvocationProxy<S> {
    fn clone(&self) -> Self {
        Self {
            registration: Arc::clone(&self.registration),
            selection_modes: Arc::clone(&self.selection_modes),
            scopes: Arc::clone(&self.scopes),
            pipeline: self.pipeline.clone(),
            telemetry: Arc::clone(&self.telemetry),
            gate: self.gate.clone(),
        }
    }
}

impl<S: ?Sized + Send + Sync + 'static> fmt::Debug for InvocationProxy<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationProxy")
            .field("service_type", self.registration.service_type())
            .field("mode", &self.registration.mode_identifier())
            .field("keys", self.registration.keys())
            .field("decorators", &self.pipeline.depth())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// InvocationProxyBuilder
// ---------------------------------------------------------------------------

/// Collects the optional collaborators of an [`InvocationProxy`].
///
/// Building cannot fail: the registration was validated when it was built.
pub struct InvocationProxyBuilder<S: ?Sized + Send + Sync + 'static> {
    registration: Arc<TrialRegistration>,
    selection_modes: Arc<SelectionModeRegistry>,
    scopes: Arc<dyn ScopeFactory<S>>,
    factories: Vec<Arc<dyn DecoratorFactory>>,
    telemetry: Arc<dyn TelemetryProvider>,
    clock: Arc<dyn ClockSource>,
    config: Arc<RouterConfig>,
}

impl<S: ?Sized + Send + Sync + 'static> InvocationProxyBuilder<S> {
    /// Appends a decorator. The first one added is the outermost.
    #[must_use]
    pub fn decorator<D: DecoratorFactory + 'static>(self, factory: D) -> Self {
        self.decorator_arc(Arc::new(factory))
    }

    #[must_use]
    pub fn decorator_arc(mut self, factory: Arc<dyn DecoratorFactory>) -> Self {
        self.factories.push(factory);
        self
    }

    /// Replaces the default no-op telemetry.
    #[must_use]
    pub fn telemetry<P: TelemetryProvider + 'static>(self, provider: P) -> Self {
        self.telemetry_arc(Arc::new(provider))
    }

    #[must_use]
    pub fn telemetry_arc(mut self, provider: Arc<dyn TelemetryProvider>) -> Self {
        self.telemetry = provider;
        self
    }

    /// Clock consulted by the activation window; the system clock by default.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Router defaults handed to decorator factories.
    #[must_use]
    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    /// Materializes every decorator factory once and freezes the proxy.
    #[must_use]
    pub fn build(self) -> InvocationProxy<S> {
        let ctx = ServiceContext {
            config: self.config,
            registration: Arc::clone(&self.registration),
        };
        let pipeline = DecoratorPipeline::build(&self.factories, &ctx);
        tracing::debug!(
            router = %ctx.config.name,
            service = %self.registration.service_type(),
            mode = %self.registration.mode_identifier(),
            keys = self.registration.keys().len(),
            decorators = pipeline.depth(),
            "invocation proxy built"
        );
        InvocationProxy {
            registration: self.registration,
            selection_modes: self.selection_modes,
            scopes: self.scopes,
            pipeline,
            telemetry: self.telemetry,
            gate: ActivationGate::new(self.clock),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
