//! Fallback planning as an explicit state machine.
//!
//! The proxy feeds each attempt's `Result` into [`FallbackMachine::advance`],
//! which answers with the next [`AttemptState`]: try another key, stop with the
//! value, or stop with the last failure. The machine never performs I/O and
//! never attempts a key twice within one call.

use std::collections::VecDeque;

use switchyard_core::{OnErrorPolicy, TimeoutAction, TrialRegistration};

/// Where a call stands after an attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum AttemptState<T, F> {
    /// Run the next attempt against this key.
    Attempting(String),
    /// The attempt succeeded; the call is done.
    Succeeded(T),
    /// No further attempts are permitted; this is the failure the caller sees.
    Exhausted(F),
}

/// Why the last attempt ended and which policy plans what comes next.
#[derive(Debug, Clone, Copy)]
pub enum FallbackTrigger<'a> {
    /// The attempt failed; the trial's on-error policy applies.
    Error(&'a OnErrorPolicy),
    /// The trial deadline expired; the timeout action applies.
    Timeout(&'a TimeoutAction),
}

/// Keys a trigger would try after `failed_key`, before removing keys already
/// attempted.
#[must_use]
pub fn fallback_keys(
    trigger: FallbackTrigger<'_>,
    registration: &TrialRegistration,
    failed_key: &str,
) -> Vec<String> {
    let default_key = registration.default_key();
    match trigger {
        FallbackTrigger::Error(policy) => match policy {
            OnErrorPolicy::Throw => Vec::new(),
            OnErrorPolicy::RedirectToDefault if failed_key == default_key => Vec::new(),
            OnErrorPolicy::RedirectToDefault => vec![default_key.to_string()],
            OnErrorPolicy::RedirectToAny => registration
                .keys()
                .iter()
                .filter(|key| key.as_str() != failed_key)
                .cloned()
                .collect(),
            OnErrorPolicy::RedirectToSpecific(key) => vec![key.clone()],
            OnErrorPolicy::RedirectOrdered(keys) => keys.clone(),
        },
        FallbackTrigger::Timeout(action) => match action {
            TimeoutAction::Throw => Vec::new(),
            TimeoutAction::FallbackToDefault => vec![default_key.to_string()],
            TimeoutAction::FallbackToSpecific(key) => vec![key.clone()],
        },
    }
}

/// Per-call fallback state.
///
/// The first failure plans the remaining attempts from the on-error policy;
/// later failures walk that plan. A timeout always replaces the plan with the
/// one from the timeout action.
#[derive(Debug, Clone)]
pub struct FallbackMachine {
    current: String,
    attempted: Vec<String>,
    pending: Option<VecDeque<String>>,
}

impl FallbackMachine {
    /// Starts a call whose primary attempt runs against `primary`.
    #[must_use]
    pub fn new(primary: impl Into<String>) -> Self {
        let primary = primary.into();
        Self {
            attempted: vec![primary.clone()],
            current: primary,
            pending: None,
        }
    }

    /// Key of the attempt in progress.
    #[must_use]
    pub fn current(&self) -> &str {
        &self.current
    }

    /// Keys attempted so far, in order.
    #[must_use]
    pub fn attempted(&self) -> &[String] {
        &self.attempted
    }

    /// Zero-based index of the attempt in progress.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn attempt_index(&self) -> u32 {
        (self.attempted.len() - 1) as u32
    }

    /// Consumes the outcome of the current attempt and decides what happens next.
    pub fn advance<T, F>(
        &mut self,
        outcome: Result<T, F>,
        trigger: FallbackTrigger<'_>,
        registration: &TrialRegistration,
    ) -> AttemptState<T, F> {
        let failure = match outcome {
            Ok(value) => return AttemptState::Succeeded(value),
            Err(failure) => failure,
        };

        if matches!(trigger, FallbackTrigger::Timeout(_)) || self.pending.is_none() {
            self.pending = Some(fallback_keys(trigger, registration, &self.current).into());
        }

        let pending = self.pending.get_or_insert_with(VecDeque::new);
        while let Some(key) = pending.pop_front() {
            if self.attempted.contains(&key) {
                continue;
            }
            self.attempted.push(key.clone());
            self.current.clone_from(&key);
            return AttemptState::Attempting(key);
        }
        AttemptState::Exhausted(failure)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
