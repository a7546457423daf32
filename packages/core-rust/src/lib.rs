//! `Switchyard` Core — trial registrations, selection modes, invocation context, and
//! the contracts of the collaborators the routing engine consumes.

pub mod clock;
pub mod context;
pub mod definition;
pub mod error;
pub mod registration;
pub mod selection;
pub mod sources;
pub mod traits;
pub mod types;

pub use clock::{ClockSource, ManualClock, SystemClock};
pub use context::{ActivationContext, InactiveReason, InvocationContext, SelectionSource};
pub use definition::{TimeoutDefinition, TrialDefinition};
pub use error::{
    BoxError, InvocationFailure, RegistrationError, ResolveError, RoutingError, SelectionError,
};
pub use registration::{
    ActivationPredicate, ActivationWindow, OnErrorPolicy, TimeoutAction, TimeoutPolicy,
    TimeoutScope, TrialRegistration, TrialRegistrationBuilder,
};
pub use selection::{
    modes, BooleanFlagProvider, ConfigurationValueProvider, RandomProvider, SelectionContext,
    SelectionModeProvider, SelectionModeRegistry,
};
pub use sources::{ConfigurationSource, FeatureFlagSource, InMemoryConfiguration, InMemoryFlags};
pub use traits::{ImplementationScope, ScopeFactory, TelemetryProvider, TelemetryScope};
pub use types::{ImplementationDescriptor, ServiceType};
