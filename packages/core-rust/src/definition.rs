//! Declarative trial definitions.
//!
//! External configuration loaders deserialize a [`TrialDefinition`] and convert
//! it with [`TrialRegistration::from_definition`], which applies the same
//! validation as the builder. Activation predicates are code, so they can only be
//! attached through the builder.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RegistrationError;
use crate::registration::{
    ActivationWindow, OnErrorPolicy, TimeoutAction, TimeoutPolicy, TimeoutScope, TrialRegistration,
    TrialRegistrationBuilder,
};
use crate::types::ImplementationDescriptor;

/// Serializable mirror of a [`TrialRegistration`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialDefinition {
    pub service_type: String,
    /// Selection mode identifier; defaults to the boolean-flag mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Selector for the mode; defaults to the service type name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    pub default_key: String,
    pub trials: Vec<ImplementationDescriptor>,
    #[serde(default)]
    pub on_error: OnErrorPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<TimeoutDefinition>,
    #[serde(default)]
    pub activation: ActivationWindow,
}

/// Serializable deadline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutDefinition {
    pub timeout_ms: u64,
    #[serde(default)]
    pub action: TimeoutAction,
    #[serde(default)]
    pub scope: TimeoutScope,
}

impl TrialDefinition {
    /// Turns the definition into a builder so callers can attach a predicate
    /// before validating.
    #[must_use]
    pub fn into_builder(self) -> TrialRegistrationBuilder {
        let mut builder = TrialRegistration::builder(self.service_type.as_str());
        if let Some(mode) = self.mode {
            let selector = self.selector.unwrap_or_else(|| self.service_type.clone());
            builder = builder.mode(mode, selector);
        } else if let Some(selector) = self.selector {
            builder = builder.mode(crate::selection::modes::BOOLEAN_FLAG, selector);
        }
        for ImplementationDescriptor { key, implementation } in self.trials {
            builder = builder.trial(key, implementation);
        }
        builder = builder
            .default_key(self.default_key)
            .on_error(self.on_error)
            .activation_window(self.activation);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(
                TimeoutPolicy::new(Duration::from_millis(timeout.timeout_ms), timeout.action)
                    .with_scope(timeout.scope),
            );
        }
        builder
    }
}

impl TrialRegistration {
    /// Validates a declarative definition.
    ///
    /// # Errors
    ///
    /// Returns the same [`RegistrationError`]s as [`TrialRegistrationBuilder::build`].
    pub fn from_definition(definition: TrialDefinition) -> Result<Self, RegistrationError> {
        definition.into_builder().build()
    }

    /// Declarative form of this registration. The activation predicate, if any,
    /// is not representable and is dropped.
    #[must_use]
    pub fn to_definition(&self) -> TrialDefinition {
        TrialDefinition {
            service_type: self.service_type().to_string(),
            mode: Some(self.mode_identifier().to_string()),
            selector: Some(self.selector_name().to_string()),
            default_key: self.default_key().to_string(),
            trials: self.trials().to_vec(),
            on_error: self.on_error().clone(),
            timeout: self.timeout().map(|t| TimeoutDefinition {
                timeout_ms: t.duration_ms(),
                action: t.action.clone(),
                scope: t.scope,
            }),
            activation: *self.window(),
        }
    }
}

impl TryFrom<TrialDefinition> for TrialRegistration {
    type Error = RegistrationError;

    fn try_from(definition: TrialDefinition) -> Result<Self, Self::Error> {
        Self::from_definition(definition)
    }
}
