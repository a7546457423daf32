//! Activation gate: decides whether a trial is live for a call before any
//! selection mode is consulted.

use std::sync::Arc;

use switchyard_core::{ActivationContext, ClockSource, InactiveReason, SystemClock, TrialRegistration};

/// Checks the activation window and predicate of a registration.
#[derive(Clone)]
pub struct ActivationGate {
    clock: Arc<dyn ClockSource>,
}

impl ActivationGate {
    #[must_use]
    pub fn new(clock: Arc<dyn ClockSource>) -> Self {
        Self { clock }
    }

    /// Returns `Ok` when the trial is active for this call.
    ///
    /// # Errors
    ///
    /// Returns the reason the trial is inactive. The window is checked before the
    /// predicate, so a predicate is never evaluated outside the window.
    pub fn evaluate(
        &self,
        registration: &TrialRegistration,
        method_name: &'static str,
    ) -> Result<(), InactiveReason> {
        let now_ms = self.clock.now_ms();
        registration.window().check(now_ms)?;

        if let Some(predicate) = registration.predicate() {
            let ctx = ActivationContext {
                service_type: registration.service_type(),
                method_name,
                now_ms,
            };
            if !predicate.evaluate(&ctx) {
                return Err(InactiveReason::PredicateRejected);
            }
        }
        Ok(())
    }
}

impl Default for ActivationGate {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl std::fmt::Debug for ActivationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationGate").finish_non_exhaustive()
    }
}
