use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::types::ServiceType;

/// Per-call context threaded through the decorator chain and handed to telemetry.
///
/// Built by the proxy once selection has finished. Fallback attempts receive a
/// copy with `attempt_key` and `attempt` updated; everything else stays as it was
/// for the primary attempt.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    /// Unique identifier of this call, shared by all of its attempts.
    pub invocation_id: Uuid,
    /// Abstraction being routed.
    pub service_type: ServiceType,
    /// Method of the routed interface being called.
    pub method_name: &'static str,
    /// Selector consulted by the selection mode (flag name, config path).
    pub selector_name: String,
    /// Key chosen for the primary attempt.
    pub selected_key: String,
    /// All trial keys in registration order.
    pub candidate_keys: Arc<[String]>,
    /// Key the current attempt runs against.
    pub attempt_key: String,
    /// Zero for the primary attempt, incremented for each fallback.
    pub attempt: u32,
}

impl InvocationContext {
    /// Creates the context for the primary attempt.
    #[must_use]
    pub fn new(
        service_type: ServiceType,
        method_name: &'static str,
        selector_name: impl Into<String>,
        selected_key: impl Into<String>,
        candidate_keys: Arc<[String]>,
    ) -> Self {
        let selected_key = selected_key.into();
        Self {
            invocation_id: Uuid::new_v4(),
            service_type,
            method_name,
            selector_name: selector_name.into(),
            attempt_key: selected_key.clone(),
            selected_key,
            candidate_keys,
            attempt: 0,
        }
    }

    /// Returns a copy describing the next attempt against `key`.
    #[must_use]
    pub fn for_attempt(&self, key: &str, attempt: u32) -> Self {
        Self {
            attempt_key: key.to_string(),
            attempt,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.attempt > 0
    }
}

/// Inputs available to an activation predicate.
#[derive(Debug, Clone, Copy)]
pub struct ActivationContext<'a> {
    pub service_type: &'a ServiceType,
    pub method_name: &'static str,
    /// Current time in milliseconds since Unix epoch.
    pub now_ms: u64,
}

/// Why a trial was considered inactive for a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InactiveReason {
    BeforeStart,
    AfterEnd,
    PredicateRejected,
}

impl InactiveReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BeforeStart => "before_start",
            Self::AfterEnd => "after_end",
            Self::PredicateRejected => "predicate_rejected",
        }
    }
}

/// Where the key of the primary attempt came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionSource {
    /// The selection mode returned a known key.
    Provider,
    /// The selection mode failed, returned nothing, or returned an unknown key.
    Default,
    /// The activation gate closed; the selection mode was not consulted.
    Inactive(InactiveReason),
}

impl SelectionSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Provider => "provider",
            Self::Default => "default",
            Self::Inactive(_) => "inactive",
        }
    }
}

impl fmt::Display for SelectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive(reason) => write!(f, "inactive ({})", reason.as_str()),
            other => f.write_str(other.as_str()),
        }
    }
}
