//! `Switchyard` Router — invocation proxy, decorator pipeline, fallback policy,
//! and built-in decorators and telemetry adapters, on tokio and tower.

pub mod config;
pub mod decorators;
pub mod fallback;
pub mod gate;
mod macros;
pub mod pipeline;
pub mod proxy;
pub mod scope;
pub mod selection;
pub mod telemetry;

pub use config::{CircuitBreakerConfig, RouterConfig, ServiceContext};
pub use decorators::{
    CircuitBreakerDecorator, CircuitBreakerFactory, CircuitState, ConcurrencyLimitDecorator,
    ConcurrencyLimitFactory, LoggingDecorator, LoggingFactory, TimeoutDecorator, TimeoutFactory,
};
pub use fallback::{fallback_keys, AttemptState, FallbackMachine, FallbackTrigger};
pub use gate::ActivationGate;
pub use pipeline::{
    factory_fn, Decorator, DecoratorFactory, DecoratorPipeline, ErasedValue, Invocation,
    InvocationResult, Next,
};
pub use proxy::{InvocationProxy, InvocationProxyBuilder};
pub use scope::{ImplementationCatalog, ScopeGuard};
pub use selection::Selection;
pub use telemetry::{MetricsTelemetry, NoopTelemetry, TelemetryGuard, TracingTelemetry};

#[doc(hidden)]
pub mod __private {
    pub use async_trait::async_trait;
}
