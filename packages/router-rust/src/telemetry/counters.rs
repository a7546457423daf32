//! Telemetry as `metrics` counters.
//!
//! Metric names:
//! - `switchyard_variant_selected_total{service, method, key, source}`
//! - `switchyard_fallbacks_total{service, method, key}`
//! - `switchyard_attempt_failures_total{service, method, key, kind}`
//! - `switchyard_invocations_total{service, method, outcome}`
//! - `switchyard_invocation_duration_seconds{service, method}` (histogram)

use std::time::Instant;

use metrics::{counter, histogram};
use switchyard_core::{InvocationContext, InvocationFailure, SelectionSource, TelemetryProvider, TelemetryScope};

/// Records through whatever `metrics` recorder the host installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsTelemetry;

impl TelemetryProvider for MetricsTelemetry {
    fn start_invocation(&self, ctx: &InvocationContext) -> Box<dyn TelemetryScope> {
        Box::new(CounterScope {
            service: ctx.service_type.to_string(),
            method: ctx.method_name,
            started: Instant::now(),
        })
    }
}

struct CounterScope {
    service: String,
    method: &'static str,
    started: Instant,
}

impl CounterScope {
    fn finish(&self, outcome: &'static str) {
        counter!(
            "switchyard_invocations_total",
            "service" => self.service.clone(),
            "method" => self.method,
            "outcome" => outcome
        )
        .increment(1);
        histogram!(
            "switchyard_invocation_duration_seconds",
            "service" => self.service.clone(),
            "method" => self.method
        )
        .record(self.started.elapsed().as_secs_f64());
    }
}

impl TelemetryScope for CounterScope {
    fn record_variant(&mut self, key: &str, source: SelectionSource) {
        counter!(
            "switchyard_variant_selected_total",
            "service" => self.service.clone(),
            "method" => self.method,
            "key" => key.to_string(),
            "source" => source.as_str()
        )
        .increment(1);
    }

    fn record_fallback(&mut self, key: &str) {
        counter!(
            "switchyard_fallbacks_total",
            "service" => self.service.clone(),
            "method" => self.method,
            "key" => key.to_string()
        )
        .increment(1);
    }

    fn record_attempt_failure(&mut self, key: &str, failure: &InvocationFailure) {
        counter!(
            "switchyard_attempt_failures_total",
            "service" => self.service.clone(),
            "method" => self.method,
            "key" => key.to_string(),
            "kind" => failure.kind()
        )
        .increment(1);
    }

    fn record_success(&mut self) {
        self.finish("ok");
    }

    fn record_failure(&mut self, failure: &InvocationFailure) {
        self.finish(failure.kind());
    }
}
