//! Demo host that routes a greeter interface between two implementations.
//!
//! The `new-greeting` flag picks the implementation; the friendly greeter can
//! be made to fail or stall so the fallback and timeout policies are visible in
//! the logs.
//!
//! ```text
//! switchyard-demo --new-greeting --calls 3
//! switchyard-demo --new-greeting --friendly-fails --json
//! switchyard-demo --trial trial.json
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use switchyard_core::{
    modes, InMemoryConfiguration, InMemoryFlags, OnErrorPolicy, RoutingError, SelectionModeRegistry,
    TimeoutAction, TimeoutPolicy, TrialDefinition, TrialRegistration,
};
use switchyard_router::{
    CircuitBreakerFactory, ConcurrencyLimitFactory, ImplementationCatalog, InvocationProxy,
    LoggingFactory, RouterConfig, TimeoutFactory, TracingTelemetry,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const SERVICE: &str = "greeter";
const FLAG: &str = "new-greeting";

#[derive(Parser, Debug)]
#[command(name = "switchyard-demo", version, about = "Route greeter calls between implementations")]
struct Args {
    /// State of the `new-greeting` flag.
    #[arg(long, env = "SWITCHYARD_NEW_GREETING")]
    new_greeting: bool,

    /// Make the friendly greeter return an error.
    #[arg(long)]
    friendly_fails: bool,

    /// Delay the friendly greeter by this many milliseconds.
    #[arg(long, default_value_t = 0)]
    friendly_delay_ms: u64,

    /// Deadline for the routed call before falling back to the default.
    #[arg(long, default_value_t = 200)]
    timeout_ms: u64,

    /// JSON trial definition to use instead of the built-in one.
    #[arg(long, env = "SWITCHYARD_TRIAL")]
    trial: Option<PathBuf>,

    /// Name to greet.
    #[arg(long, default_value = "world")]
    name: String,

    /// Number of calls to make.
    #[arg(long, default_value_t = 1)]
    calls: u32,

    /// Emit logs as JSON.
    #[arg(long, env = "SWITCHYARD_LOG_JSON")]
    json: bool,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

// ---------------------------------------------------------------------------
// Greeter interface
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
enum GreetError {
    #[error("greeter unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Routing(#[from] RoutingError),
}

#[async_trait]
trait Greeter: Send + Sync {
    async fn greet(&self, name: String) -> Result<String, GreetError>;
}

struct ClassicGreeter;

#[async_trait]
impl Greeter for ClassicGreeter {
    async fn greet(&self, name: String) -> Result<String, GreetError> {
        Ok(format!("Hello, {name}."))
    }
}

struct FriendlyGreeter {
    fails: bool,
    delay: Duration,
}

#[async_trait]
impl Greeter for FriendlyGreeter {
    async fn greet(&self, name: String) -> Result<String, GreetError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fails {
            return Err(GreetError::Unavailable("friendly greeter is switched off".to_string()));
        }
        Ok(format!("Hey {name}, great to see you!"))
    }
}

switchyard_router::route_methods! {
    impl Greeter {
        async fn greet(&self, name: String) -> Result<String, GreetError>;
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

fn init_tracing(args: &Args) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if args.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_registration(args: &Args) -> anyhow::Result<TrialRegistration> {
    if let Some(path) = &args.trial {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading trial definition {}", path.display()))?;
        let definition: TrialDefinition = serde_json::from_str(&raw)
            .with_context(|| format!("parsing trial definition {}", path.display()))?;
        return TrialRegistration::from_definition(definition).context("invalid trial definition");
    }

    TrialRegistration::builder(SERVICE)
        .mode(modes::BOOLEAN_FLAG, FLAG)
        .default_trial("false", "classic")
        .trial("true", "friendly")
        .on_error(OnErrorPolicy::RedirectToDefault)
        .timeout(TimeoutPolicy::new(
            Duration::from_millis(args.timeout_ms),
            TimeoutAction::FallbackToDefault,
        ))
        .build()
        .context("invalid built-in trial")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args);

    let registration = load_registration(&args)?;

    let flags = Arc::new(InMemoryFlags::new());
    flags.set(FLAG, args.new_greeting);
    let modes = Arc::new(SelectionModeRegistry::with_defaults(
        flags,
        Arc::new(InMemoryConfiguration::new()),
    ));

    let catalog = ImplementationCatalog::<dyn Greeter>::new();
    catalog.register("classic", || Arc::new(ClassicGreeter) as Arc<dyn Greeter>);
    let friendly: Arc<dyn Greeter> = Arc::new(FriendlyGreeter {
        fails: args.friendly_fails,
        delay: Duration::from_millis(args.friendly_delay_ms),
    });
    catalog.register_instance("friendly", friendly);

    let proxy = InvocationProxy::<dyn Greeter>::builder(registration, modes, Arc::new(catalog.clone()))
        .config(RouterConfig {
            name: "switchyard-demo".to_string(),
            ..RouterConfig::default()
        })
        .decorator(LoggingFactory)
        .decorator(ConcurrencyLimitFactory::default())
        .decorator(CircuitBreakerFactory::default())
        .decorator(TimeoutFactory::default())
        .telemetry(TracingTelemetry)
        .build();

    info!(
        service = %proxy.registration().service_type(),
        decorators = proxy.decorator_count(),
        "proxy ready"
    );

    let greeter: Arc<dyn Greeter> = Arc::new(proxy);
    for call in 1..=args.calls {
        match greeter.greet(args.name.clone()).await {
            Ok(greeting) => println!("{call}: {greeting}"),
            Err(err) => println!("{call}: error: {err}"),
        }
    }

    info!(open_scopes = catalog.open_scopes(), "done");
    Ok(())
}
