//! Shared fixtures for the router integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use switchyard_core::{
    modes, ImplementationDescriptor, ImplementationScope, InMemoryConfiguration, InMemoryFlags,
    InvocationContext, InvocationFailure, ResolveError, RoutingError, ScopeFactory, SelectionModeRegistry,
    SelectionSource, TelemetryProvider, TelemetryScope, TrialRegistrationBuilder,
};
use switchyard_router::ImplementationCatalog;

/// Configuration path read by the configuration-value mode in these tests.
pub const SELECTOR: &str = "greeter.variant";

// ---------------------------------------------------------------------------
// Greeter interface
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GreetError {
    #[error("{0} failed")]
    Failed(String),
    #[error("routing: {0}")]
    Routing(String),
}

impl From<RoutingError> for GreetError {
    fn from(error: RoutingError) -> Self {
        Self::Routing(error.to_string())
    }
}

#[async_trait]
pub trait Greeter: Send + Sync {
    async fn greet(&self, name: String) -> Result<String, GreetError>;
}

switchyard_router::route_methods! {
    impl Greeter {
        async fn greet(&self, name: String) -> Result<String, GreetError>;
    }
}

/// How a scripted implementation answers.
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Succeed,
    Fail,
    Delay(Duration),
    Hang,
}

/// Implementation names in the order they were invoked.
pub type CallLog = Arc<Mutex<Vec<&'static str>>>;

pub struct Scripted {
    name: &'static str,
    behavior: Behavior,
    log: CallLog,
}

#[async_trait]
impl Greeter for Scripted {
    async fn greet(&self, name: String) -> Result<String, GreetError> {
        self.log.lock().push(self.name);
        match self.behavior {
            Behavior::Succeed => Ok(format!("{} greets {name}", self.name)),
            Behavior::Fail => Err(GreetError::Failed(self.name.to_string())),
            Behavior::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(format!("{} greets {name}", self.name))
            }
            Behavior::Hang => std::future::pending().await,
        }
    }
}

/// Catalog whose implementations append their name to the returned log.
pub fn catalog(implementations: &[(&'static str, Behavior)]) -> (ImplementationCatalog<dyn Greeter>, CallLog) {
    let log = CallLog::default();
    let catalog = ImplementationCatalog::<dyn Greeter>::new();
    for &(name, behavior) in implementations {
        let log = Arc::clone(&log);
        catalog.register(name, move || {
            Arc::new(Scripted {
                name,
                behavior,
                log: Arc::clone(&log),
            }) as Arc<dyn Greeter>
        });
    }
    (catalog, log)
}

/// Registration selecting through the configuration-value mode at [`SELECTOR`].
/// Keys are lowercase, implementations the same letter in uppercase.
pub fn registration(default_key: &str, keys: &[&str]) -> TrialRegistrationBuilder {
    let mut builder = switchyard_core::TrialRegistration::builder("greeter").mode(modes::CONFIGURATION_VALUE, SELECTOR);
    for key in keys {
        let implementation = key.to_uppercase();
        builder = if *key == default_key {
            builder.default_trial(*key, implementation)
        } else {
            builder.trial(*key, implementation)
        };
    }
    builder
}

/// Default modes with the configuration value at [`SELECTOR`] set to `selected`.
pub fn modes_selecting(selected: &str) -> Arc<SelectionModeRegistry> {
    let config = InMemoryConfiguration::new();
    config.set(SELECTOR, selected);
    Arc::new(SelectionModeRegistry::with_defaults(
        Arc::new(InMemoryFlags::new()),
        Arc::new(config),
    ))
}

// ---------------------------------------------------------------------------
// Scope accounting
// ---------------------------------------------------------------------------

/// Wraps a catalog and counts scopes created and disposed.
pub struct CountingScopes {
    inner: ImplementationCatalog<dyn Greeter>,
    created: Arc<AtomicUsize>,
    disposed: Arc<AtomicUsize>,
}

impl CountingScopes {
    pub fn new(inner: ImplementationCatalog<dyn Greeter>) -> Self {
        Self {
            inner,
            created: Arc::new(AtomicUsize::new(0)),
            disposed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn disposed(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl ScopeFactory<dyn Greeter> for CountingScopes {
    fn create_scope(&self) -> Box<dyn ImplementationScope<dyn Greeter>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Box::new(CountingScope {
            inner: self.inner.create_scope(),
            disposed: Arc::clone(&self.disposed),
        })
    }
}

struct CountingScope {
    inner: Box<dyn ImplementationScope<dyn Greeter>>,
    disposed: Arc<AtomicUsize>,
}

#[async_trait]
impl ImplementationScope<dyn Greeter> for CountingScope {
    async fn resolve(&mut self, descriptor: &ImplementationDescriptor) -> Result<Arc<dyn Greeter>, ResolveError> {
        self.inner.resolve(descriptor).await
    }

    fn dispose(&mut self) {
        self.disposed.fetch_add(1, Ordering::SeqCst);
        self.inner.dispose();
    }
}

// ---------------------------------------------------------------------------
// Telemetry recording
// ---------------------------------------------------------------------------

/// Telemetry provider that keeps every event as a line of text.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// Keys passed to `record_fallback`, in order.
    pub fn fallbacks(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| event.strip_prefix("fallback ").map(str::to_string))
            .collect()
    }
}

impl TelemetryProvider for Recorder {
    fn start_invocation(&self, _ctx: &InvocationContext) -> Box<dyn TelemetryScope> {
        Box::new(RecordingScope {
            events: Arc::clone(&self.events),
        })
    }
}

struct RecordingScope {
    events: Arc<Mutex<Vec<String>>>,
}

impl TelemetryScope for RecordingScope {
    fn record_variant(&mut self, key: &str, source: SelectionSource) {
        self.events.lock().push(format!("variant {key} {source}"));
    }

    fn record_fallback(&mut self, key: &str) {
        self.events.lock().push(format!("fallback {key}"));
    }

    fn record_attempt_failure(&mut self, key: &str, failure: &InvocationFailure) {
        self.events
            .lock()
            .push(format!("attempt_failure {key} {}", failure.kind()));
    }

    fn record_success(&mut self) {
        self.events.lock().push("success".to_string());
    }

    fn record_failure(&mut self, failure: &InvocationFailure) {
        self.events.lock().push(format!("failure {}", failure.kind()));
    }

    fn dispose(&mut self) {
        self.events.lock().push("dispose".to_string());
    }
}
