use switchyard_core::{InvocationContext, InvocationFailure, SelectionSource, TelemetryProvider, TelemetryScope};

/// Telemetry provider that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl TelemetryProvider for NoopTelemetry {
    fn start_invocation(&self, _ctx: &InvocationContext) -> Box<dyn TelemetryScope> {
        Box::new(NoopScope)
    }
}

struct NoopScope;

impl TelemetryScope for NoopScope {
    fn record_variant(&mut self, _key: &str, _source: SelectionSource) {}

    fn record_fallback(&mut self, _key: &str) {}

    fn record_success(&mut self) {}

    fn record_failure(&mut self, _failure: &InvocationFailure) {}
}
