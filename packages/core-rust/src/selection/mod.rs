//! Selection modes: pluggable strategies that pick a trial key per call.
//!
//! - [`SelectionModeProvider`]: the strategy contract
//! - [`SelectionModeRegistry`]: lookup of providers by mode identifier
//! - [`BooleanFlagProvider`], [`ConfigurationValueProvider`], [`RandomProvider`]:
//!   built-in strategies

pub mod boolean_flag;
pub mod configuration;
pub mod random;
pub mod registry;

pub use boolean_flag::BooleanFlagProvider;
pub use configuration::ConfigurationValueProvider;
pub use random::RandomProvider;
pub use registry::SelectionModeRegistry;

use async_trait::async_trait;

use crate::error::SelectionError;
use crate::registration::TrialRegistration;
use crate::types::ServiceType;

/// Well-known mode identifiers for the built-in strategies.
pub mod modes {
    pub const BOOLEAN_FLAG: &str = "boolean-flag";
    pub const CONFIGURATION_VALUE: &str = "configuration-value";
    pub const RANDOM: &str = "random";
}

/// What a selection mode can see about the call it is choosing for.
#[derive(Debug, Clone, Copy)]
pub struct SelectionContext<'a> {
    registration: &'a TrialRegistration,
    method_name: &'static str,
}

impl<'a> SelectionContext<'a> {
    #[must_use]
    pub fn new(registration: &'a TrialRegistration, method_name: &'static str) -> Self {
        Self {
            registration,
            method_name,
        }
    }

    #[must_use]
    pub fn service_type(&self) -> &'a ServiceType {
        self.registration.service_type()
    }

    #[must_use]
    pub fn method_name(&self) -> &'static str {
        self.method_name
    }

    /// Flag name, configuration path, or whatever the mode looks up.
    #[must_use]
    pub fn selector_name(&self) -> &'a str {
        self.registration.selector_name()
    }

    #[must_use]
    pub fn default_key(&self) -> &'a str {
        self.registration.default_key()
    }

    /// Trial keys in registration order.
    #[must_use]
    pub fn candidate_keys(&self) -> &'a [String] {
        self.registration.keys()
    }

    #[must_use]
    pub fn is_candidate(&self, key: &str) -> bool {
        self.registration.contains_key(key)
    }
}

/// Strategy that maps a call to a trial key.
///
/// `Ok(None)` means "no opinion" and, like any `Err`, resolves to the default key.
/// Returning a key outside the candidates is also treated as no opinion.
/// Implementations are shared across concurrent calls.
#[async_trait]
pub trait SelectionModeProvider: Send + Sync {
    async fn select_key(&self, ctx: &SelectionContext<'_>) -> Result<Option<String>, SelectionError>;
}
