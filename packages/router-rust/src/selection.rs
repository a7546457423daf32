//! Resolves the key of the primary attempt.
//!
//! Selection never fails a call: an unknown mode, a provider error, no opinion,
//! or a key outside the trial all resolve to the default key.

use switchyard_core::{
    InactiveReason, SelectionContext, SelectionModeRegistry, SelectionSource, TrialRegistration,
};

/// The key chosen for the primary attempt and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub key: String,
    pub source: SelectionSource,
}

impl Selection {
    fn default_for(registration: &TrialRegistration, source: SelectionSource) -> Self {
        Self {
            key: registration.default_key().to_string(),
            source,
        }
    }

    /// Default key because the trial is inactive; no provider is consulted.
    #[must_use]
    pub fn inactive(registration: &TrialRegistration, reason: InactiveReason) -> Self {
        Self::default_for(registration, SelectionSource::Inactive(reason))
    }
}

/// Asks the registration's selection mode for a key.
pub async fn select(
    modes: &SelectionModeRegistry,
    registration: &TrialRegistration,
    method_name: &'static str,
) -> Selection {
    let service = registration.service_type();
    let mode = registration.mode_identifier();

    let Some(provider) = modes.get(mode) else {
        tracing::warn!(
            service = %service,
            mode = %mode,
            "selection mode not registered, using default key"
        );
        return Selection::default_for(registration, SelectionSource::Default);
    };

    let ctx = SelectionContext::new(registration, method_name);
    match provider.select_key(&ctx).await {
        Ok(Some(key)) if registration.contains_key(&key) => {
            tracing::debug!(service = %service, mode = %mode, key = %key, "key selected");
            Selection {
                key,
                source: SelectionSource::Provider,
            }
        }
        Ok(Some(key)) => {
            tracing::warn!(
                service = %service,
                mode = %mode,
                key = %key,
                "selected key is not a trial key, using default key"
            );
            Selection::default_for(registration, SelectionSource::Default)
        }
        Ok(None) => {
            tracing::debug!(service = %service, mode = %mode, "no key selected, using default key");
            Selection::default_for(registration, SelectionSource::Default)
        }
        Err(error) => {
            tracing::warn!(
                service = %service,
                mode = %mode,
                error = %error,
                "selection failed, using default key"
            );
            Selection::default_for(registration, SelectionSource::Default)
        }
    }
}
