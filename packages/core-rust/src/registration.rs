//! Immutable trial registrations.
//!
//! A [`TrialRegistration`] describes one experiment: which selection mode picks
//! the key, which implementations exist, what happens when one fails or runs too
//! long, and when the trial is active at all. It is validated once by
//! [`TrialRegistrationBuilder::build`] and never mutated afterwards, so the proxy
//! shares it across concurrent calls without locking.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::{ActivationContext, InactiveReason};
use crate::error::RegistrationError;
use crate::selection::modes;
use crate::types::{ImplementationDescriptor, ServiceType};

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// What the proxy does when the chosen implementation fails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnErrorPolicy {
    /// Surface the original error.
    #[default]
    Throw,
    /// Retry once against the default key.
    RedirectToDefault,
    /// Try every other key in registration order until one succeeds.
    RedirectToAny,
    /// Retry once against the given key.
    RedirectToSpecific(String),
    /// Try the listed keys in order until one succeeds.
    RedirectOrdered(Vec<String>),
}

/// What the proxy does when the trial's deadline expires.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutAction {
    /// Surface the timeout as the call's error.
    #[default]
    Throw,
    /// Run the default key without a deadline.
    FallbackToDefault,
    /// Run the given key without a deadline.
    FallbackToSpecific(String),
}

/// Which attempts a trial deadline covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutScope {
    /// The primary attempt and any on-error fallbacks share one deadline.
    #[default]
    WholeSequence,
    /// Only the primary attempt is bounded.
    FirstAttempt,
}

/// Deadline configuration for a trial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub duration: Duration,
    pub action: TimeoutAction,
    pub scope: TimeoutScope,
}

impl TimeoutPolicy {
    #[must_use]
    pub fn new(duration: Duration, action: TimeoutAction) -> Self {
        Self {
            duration,
            action,
            scope: TimeoutScope::default(),
        }
    }

    #[must_use]
    pub fn with_scope(mut self, scope: TimeoutScope) -> Self {
        self.scope = scope;
        self
    }

    /// Deadline length in whole milliseconds, for logs and error messages.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn duration_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }
}

// ---------------------------------------------------------------------------
// Activation
// ---------------------------------------------------------------------------

/// Inclusive time window in milliseconds since Unix epoch. Unset bounds are open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationWindow {
    pub start_ms: Option<u64>,
    pub end_ms: Option<u64>,
}

impl ActivationWindow {
    /// Checks whether `now_ms` falls inside the window.
    ///
    /// # Errors
    ///
    /// Returns the bound that `now_ms` violates.
    pub fn check(&self, now_ms: u64) -> Result<(), InactiveReason> {
        if self.start_ms.is_some_and(|start| now_ms < start) {
            return Err(InactiveReason::BeforeStart);
        }
        if self.end_ms.is_some_and(|end| now_ms > end) {
            return Err(InactiveReason::AfterEnd);
        }
        Ok(())
    }

    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        self.start_ms.is_none() && self.end_ms.is_none()
    }
}

/// Runtime predicate deciding whether a trial is active for a call.
#[derive(Clone)]
pub struct ActivationPredicate(Arc<dyn Fn(&ActivationContext<'_>) -> bool + Send + Sync>);

impl ActivationPredicate {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&ActivationContext<'_>) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    #[must_use]
    pub fn evaluate(&self, ctx: &ActivationContext<'_>) -> bool {
        (self.0)(ctx)
    }
}

impl fmt::Debug for ActivationPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ActivationPredicate(..)")
    }
}

// ---------------------------------------------------------------------------
// TrialRegistration
// ---------------------------------------------------------------------------

/// Validated, read-only description of one trial.
#[derive(Debug, Clone)]
pub struct TrialRegistration {
    service_type: ServiceType,
    mode_identifier: String,
    selector_name: String,
    default_key: String,
    trials: Vec<ImplementationDescriptor>,
    keys: Arc<[String]>,
    on_error: OnErrorPolicy,
    timeout: Option<TimeoutPolicy>,
    window: ActivationWindow,
    predicate: Option<ActivationPredicate>,
}

impl TrialRegistration {
    /// Starts a registration for `service_type`.
    ///
    /// The selection mode defaults to [`modes::BOOLEAN_FLAG`] with the service
    /// type name as the flag name.
    pub fn builder(service_type: impl Into<ServiceType>) -> TrialRegistrationBuilder {
        TrialRegistrationBuilder::new(service_type.into())
    }

    #[must_use]
    pub fn service_type(&self) -> &ServiceType {
        &self.service_type
    }

    #[must_use]
    pub fn mode_identifier(&self) -> &str {
        &self.mode_identifier
    }

    #[must_use]
    pub fn selector_name(&self) -> &str {
        &self.selector_name
    }

    #[must_use]
    pub fn default_key(&self) -> &str {
        &self.default_key
    }

    /// Trials in registration order.
    #[must_use]
    pub fn trials(&self) -> &[ImplementationDescriptor] {
        &self.trials
    }

    /// Trial keys in registration order.
    #[must_use]
    pub fn keys(&self) -> &Arc<[String]> {
        &self.keys
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    #[must_use]
    pub fn descriptor(&self, key: &str) -> Option<&ImplementationDescriptor> {
        self.trials.iter().find(|d| d.key == key)
    }

    #[must_use]
    pub fn on_error(&self) -> &OnErrorPolicy {
        &self.on_error
    }

    #[must_use]
    pub fn timeout(&self) -> Option<&TimeoutPolicy> {
        self.timeout.as_ref()
    }

    #[must_use]
    pub fn window(&self) -> &ActivationWindow {
        &self.window
    }

    #[must_use]
    pub fn predicate(&self) -> Option<&ActivationPredicate> {
        self.predicate.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Accumulates a trial description; [`build`](Self::build) validates it.
#[derive(Debug, Clone)]
pub struct TrialRegistrationBuilder {
    service_type: ServiceType,
    mode_identifier: String,
    selector_name: Option<String>,
    default_key: Option<String>,
    trials: Vec<ImplementationDescriptor>,
    on_error: OnErrorPolicy,
    timeout: Option<TimeoutPolicy>,
    window: ActivationWindow,
    predicate: Option<ActivationPredicate>,
}

impl TrialRegistrationBuilder {
    fn new(service_type: ServiceType) -> Self {
        Self {
            service_type,
            mode_identifier: modes::BOOLEAN_FLAG.to_string(),
            selector_name: None,
            default_key: None,
            trials: Vec::new(),
            on_error: OnErrorPolicy::default(),
            timeout: None,
            window: ActivationWindow::default(),
            predicate: None,
        }
    }

    /// Selection mode and the selector it consults.
    #[must_use]
    pub fn mode(mut self, mode_identifier: impl Into<String>, selector_name: impl Into<String>) -> Self {
        self.mode_identifier = mode_identifier.into();
        self.selector_name = Some(selector_name.into());
        self
    }

    /// Adds a trial. Registration order is the order used by `RedirectToAny`.
    #[must_use]
    pub fn trial(mut self, key: impl Into<String>, implementation: impl Into<String>) -> Self {
        self.trials.push(ImplementationDescriptor::new(key, implementation));
        self
    }

    /// Adds a trial and marks it as the default.
    #[must_use]
    pub fn default_trial(mut self, key: impl Into<String>, implementation: impl Into<String>) -> Self {
        let key = key.into();
        self.default_key = Some(key.clone());
        self.trials.push(ImplementationDescriptor::new(key, implementation));
        self
    }

    #[must_use]
    pub fn default_key(mut self, key: impl Into<String>) -> Self {
        self.default_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn on_error(mut self, policy: OnErrorPolicy) -> Self {
        self.on_error = policy;
        self
    }

    #[must_use]
    pub fn timeout(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout = Some(policy);
        self
    }

    #[must_use]
    pub fn active_from(mut self, start_ms: u64) -> Self {
        self.window.start_ms = Some(start_ms);
        self
    }

    #[must_use]
    pub fn active_until(mut self, end_ms: u64) -> Self {
        self.window.end_ms = Some(end_ms);
        self
    }

    #[must_use]
    pub fn activation_window(mut self, window: ActivationWindow) -> Self {
        self.window = window;
        self
    }

    #[must_use]
    pub fn activation_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ActivationContext<'_>) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(ActivationPredicate::new(predicate));
        self
    }

    /// Validates the description and freezes it.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistrationError`] naming the first violated invariant:
    /// empty or duplicate keys, a default or fallback key outside the trials,
    /// an empty ordered fallback list, a zero timeout, or an inverted window.
    pub fn build(self) -> Result<TrialRegistration, RegistrationError> {
        if self.trials.is_empty() {
            return Err(RegistrationError::EmptyTrials {
                service_type: self.service_type.to_string(),
            });
        }

        let mut keys: Vec<String> = Vec::with_capacity(self.trials.len());
        for descriptor in &self.trials {
            if descriptor.key.is_empty() {
                return Err(RegistrationError::EmptyKey);
            }
            if keys.contains(&descriptor.key) {
                return Err(RegistrationError::DuplicateKey {
                    key: descriptor.key.clone(),
                });
            }
            keys.push(descriptor.key.clone());
        }
        let known = |key: &str| keys.iter().any(|k| k == key);

        let default_key = self.default_key.ok_or_else(|| RegistrationError::MissingDefaultKey {
            service_type: self.service_type.to_string(),
        })?;
        if !known(default_key.as_str()) {
            return Err(RegistrationError::UnknownDefaultKey { key: default_key });
        }

        match &self.on_error {
            OnErrorPolicy::RedirectToSpecific(key) if !known(key.as_str()) => {
                return Err(RegistrationError::UnknownFallbackKey { key: key.clone() });
            }
            OnErrorPolicy::RedirectOrdered(ordered) => {
                if ordered.is_empty() {
                    return Err(RegistrationError::EmptyFallbackList);
                }
                if let Some(key) = ordered.iter().find(|k| !known(k.as_str())) {
                    return Err(RegistrationError::UnknownFallbackKey { key: key.clone() });
                }
            }
            _ => {}
        }

        if let Some(timeout) = &self.timeout {
            if timeout.duration.is_zero() {
                return Err(RegistrationError::ZeroTimeout);
            }
            if let TimeoutAction::FallbackToSpecific(key) = &timeout.action {
                if !known(key.as_str()) {
                    return Err(RegistrationError::UnknownTimeoutFallbackKey { key: key.clone() });
                }
            }
        }

        if let (Some(start_ms), Some(end_ms)) = (self.window.start_ms, self.window.end_ms) {
            if start_ms > end_ms {
                return Err(RegistrationError::InvertedWindow { start_ms, end_ms });
            }
        }

        let selector_name = self
            .selector_name
            .unwrap_or_else(|| self.service_type.to_string());

        Ok(TrialRegistration {
            service_type: self.service_type,
            mode_identifier: self.mode_identifier,
            selector_name,
            default_key,
            trials: self.trials,
            keys: keys.into(),
            on_error: self.on_error,
            timeout: self.timeout,
            window: self.window,
            predicate: self.predicate,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
