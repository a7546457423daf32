//! Error taxonomy shared by the registration model and the routing engine.
//!
//! - [`RegistrationError`]: a trial registration violates an invariant (construction time)
//! - [`SelectionError`]: a selection mode could not produce a key (never surfaced)
//! - [`ResolveError`]: the scoped resolver could not build an implementation
//! - [`RoutingError`]: failures raised by the engine or a decorator rather than by
//!   the implementation itself
//! - [`InvocationFailure`]: what flows through the decorator pipeline and the
//!   fallback machinery

use std::error::Error as StdError;

/// Type-erased error carried through the pipeline.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// A trial registration that cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("trial for `{service_type}` has no implementations")]
    EmptyTrials { service_type: String },
    #[error("trial keys must not be empty")]
    EmptyKey,
    #[error("trial key `{key}` is registered more than once")]
    DuplicateKey { key: String },
    #[error("trial for `{service_type}` has no default key")]
    MissingDefaultKey { service_type: String },
    #[error("default key `{key}` is not one of the trial keys")]
    UnknownDefaultKey { key: String },
    #[error("fallback key `{key}` is not one of the trial keys")]
    UnknownFallbackKey { key: String },
    #[error("ordered fallback policy needs at least one key")]
    EmptyFallbackList,
    #[error("timeout fallback key `{key}` is not one of the trial keys")]
    UnknownTimeoutFallbackKey { key: String },
    #[error("timeout must be greater than zero")]
    ZeroTimeout,
    #[error("activation window starts ({start_ms}) after it ends ({end_ms})")]
    InvertedWindow { start_ms: u64, end_ms: u64 },
}

/// Why a selection mode could not produce a key.
///
/// Selection failures are resolved to the default key by the proxy and only
/// ever show up in logs.
#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("no selection mode registered as `{mode}`")]
    UnknownMode { mode: String },
    #[error("flag `{flag}` is not defined")]
    FlagUndefined { flag: String },
    #[error("no configuration value at `{path}`")]
    ValueMissing { path: String },
    #[error("configuration value at `{path}` cannot be used as a key")]
    UnsupportedValue { path: String },
    #[error("selection source failed: {0}")]
    Source(#[from] anyhow::Error),
}

/// Failure to acquire an implementation instance from a scope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("no implementation registered as `{implementation}`")]
    Unregistered { implementation: String },
    #[error("failed to construct `{implementation}`: {reason}")]
    Construction {
        implementation: String,
        reason: String,
    },
    #[error("scope already disposed")]
    Disposed,
}

/// Failures raised by the routing engine or a decorator.
///
/// Routed interfaces declare an error type `E: From<RoutingError>` so these can
/// reach the caller through the interface's own signature.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("attempt on `{key}` timed out after {timeout_ms}ms")]
    Timeout { key: String, timeout_ms: u64 },
    #[error("circuit open for `{service_type}` key `{key}`")]
    CircuitOpen { service_type: String, key: String },
    #[error("invocation rejected: concurrency limit reached")]
    Overloaded,
    #[error("invocation cancelled")]
    Cancelled,
    #[error("failed to resolve implementation for key `{key}`")]
    Resolution {
        key: String,
        #[source]
        source: ResolveError,
    },
    #[error("result for `{method}` has an unexpected type")]
    ResultShape { method: String },
    #[error("decorator failure: {0}")]
    Decorator(#[from] anyhow::Error),
    #[error("unrecognized implementation failure: {0}")]
    Unrecognized(#[source] BoxError),
}

/// A failed attempt as seen by decorators and the fallback machinery.
#[derive(Debug, thiserror::Error)]
pub enum InvocationFailure {
    /// The implementation itself returned an error.
    #[error(transparent)]
    Implementation(BoxError),
    /// The engine or a decorator failed the attempt.
    #[error(transparent)]
    Routing(#[from] RoutingError),
}

impl InvocationFailure {
    /// Wraps an implementation error so it can be restored verbatim later.
    pub fn implementation<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Implementation(Box::new(error))
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Routing(RoutingError::Timeout { .. }))
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Routing(RoutingError::Cancelled))
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Implementation(_) => "implementation",
            Self::Routing(RoutingError::Timeout { .. }) => "timeout",
            Self::Routing(RoutingError::CircuitOpen { .. }) => "circuit_open",
            Self::Routing(RoutingError::Overloaded) => "overloaded",
            Self::Routing(RoutingError::Cancelled) => "cancelled",
            Self::Routing(RoutingError::Resolution { .. }) => "resolution",
            Self::Routing(RoutingError::ResultShape { .. }) => "result_shape",
            Self::Routing(RoutingError::Decorator(_)) => "decorator",
            Self::Routing(RoutingError::Unrecognized(_)) => "unrecognized",
        }
    }

    /// Converts the failure into the routed interface's error type.
    ///
    /// Implementation errors of type `E` come back unchanged, so a caller sees
    /// exactly what the implementation returned.
    pub fn into_caller_error<E>(self) -> E
    where
        E: StdError + From<RoutingError> + 'static,
    {
        match self {
            Self::Implementation(error) => match error.downcast::<E>() {
                Ok(original) => *original,
                Err(other) => E::from(RoutingError::Unrecognized(other)),
            },
            Self::Routing(error) => E::from(error),
        }
    }
}
