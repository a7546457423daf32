//! Telemetry adapters and the per-call guard the proxy reports through.
//!
//! - [`NoopTelemetry`]: records nothing; the proxy default
//! - [`TracingTelemetry`]: structured `tracing` events per call
//! - [`MetricsTelemetry`]: counters and a duration histogram via the `metrics` facade
//!
//! Adapters only emit; installing a subscriber or recorder is up to the host.

pub mod counters;
pub mod noop;
pub mod traced;

pub use counters::MetricsTelemetry;
pub use noop::NoopTelemetry;
pub use traced::TracingTelemetry;

use switchyard_core::{InvocationContext, InvocationFailure, SelectionSource, TelemetryProvider, TelemetryScope};

/// Owns one call's telemetry scope.
///
/// The final outcome is reported at most once, and the scope is disposed exactly
/// once: explicitly through [`finish_success`](Self::finish_success) or
/// [`finish_failure`](Self::finish_failure), or on drop when the call is
/// cancelled mid-flight.
pub struct TelemetryGuard {
    scope: Option<Box<dyn TelemetryScope>>,
}

impl TelemetryGuard {
    #[must_use]
    pub fn start(provider: &dyn TelemetryProvider, ctx: &InvocationContext) -> Self {
        Self {
            scope: Some(provider.start_invocation(ctx)),
        }
    }

    pub fn record_variant(&mut self, key: &str, source: SelectionSource) {
        if let Some(scope) = self.scope.as_mut() {
            scope.record_variant(key, source);
        }
    }

    pub fn record_fallback(&mut self, key: &str) {
        if let Some(scope) = self.scope.as_mut() {
            scope.record_fallback(key);
        }
    }

    pub fn record_attempt_failure(&mut self, key: &str, failure: &InvocationFailure) {
        if let Some(scope) = self.scope.as_mut() {
            scope.record_attempt_failure(key, failure);
        }
    }

    /// Reports success and closes the scope.
    pub fn finish_success(&mut self) {
        if let Some(mut scope) = self.scope.take() {
            scope.record_success();
            scope.dispose();
        }
    }

    /// Reports the final failure and closes the scope.
    pub fn finish_failure(&mut self, failure: &InvocationFailure) {
        if let Some(mut scope) = self.scope.take() {
            scope.record_failure(failure);
            scope.dispose();
        }
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(mut scope) = self.scope.take() {
            scope.dispose();
        }
    }
}
