//! Telemetry as structured `tracing` events.

use std::time::Instant;

use switchyard_core::{InvocationContext, InvocationFailure, SelectionSource, TelemetryProvider, TelemetryScope};
use uuid::Uuid;

/// Emits one event per telemetry call under the `switchyard::telemetry` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl TelemetryProvider for TracingTelemetry {
    fn start_invocation(&self, ctx: &InvocationContext) -> Box<dyn TelemetryScope> {
        Box::new(TracedScope {
            invocation_id: ctx.invocation_id,
            service: ctx.service_type.to_string(),
            method: ctx.method_name,
            started: Instant::now(),
        })
    }
}

struct TracedScope {
    invocation_id: Uuid,
    service: String,
    method: &'static str,
    started: Instant,
}

impl TracedScope {
    #[allow(clippy::cast_possible_truncation)]
    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

impl TelemetryScope for TracedScope {
    fn record_variant(&mut self, key: &str, source: SelectionSource) {
        tracing::info!(
            target: "switchyard::telemetry",
            invocation_id = %self.invocation_id,
            service = %self.service,
            method = self.method,
            key = key,
            source = %source,
            "variant selected"
        );
    }

    fn record_fallback(&mut self, key: &str) {
        tracing::warn!(
            target: "switchyard::telemetry",
            invocation_id = %self.invocation_id,
            service = %self.service,
            method = self.method,
            key = key,
            "falling back"
        );
    }

    fn record_attempt_failure(&mut self, key: &str, failure: &InvocationFailure) {
        tracing::warn!(
            target: "switchyard::telemetry",
            invocation_id = %self.invocation_id,
            service = %self.service,
            method = self.method,
            key = key,
            kind = failure.kind(),
            error = %failure,
            "attempt failed"
        );
    }

    fn record_success(&mut self) {
        tracing::info!(
            target: "switchyard::telemetry",
            invocation_id = %self.invocation_id,
            service = %self.service,
            method = self.method,
            duration_ms = self.elapsed_ms(),
            "invocation succeeded"
        );
    }

    fn record_failure(&mut self, failure: &InvocationFailure) {
        tracing::error!(
            target: "switchyard::telemetry",
            invocation_id = %self.invocation_id,
            service = %self.service,
            method = self.method,
            duration_ms = self.elapsed_ms(),
            kind = failure.kind(),
            error = %failure,
            "invocation failed"
        );
    }
}
