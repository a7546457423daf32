use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of the abstraction being routed (e.g. `"greeter"`, `"pricing"`).
///
/// One trial registration exists per service type. The name shows up in logs,
/// telemetry labels, and circuit-breaker errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceType(String);

impl ServiceType {
    /// Creates a service type from any string-like name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the service type name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ServiceType {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// One candidate implementation within a trial.
///
/// `key` is the condition name selection strategies return (e.g. `"control"`,
/// `"true"`). `implementation` is the name the scoped resolver uses to build an
/// instance; several keys may share one implementation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImplementationDescriptor {
    /// Condition key, compared byte-wise.
    pub key: String,
    /// Name of the concrete implementation registered with the resolver.
    pub implementation: String,
}

impl ImplementationDescriptor {
    #[must_use]
    pub fn new(key: impl Into<String>, implementation: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            implementation: implementation.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_type_serializes_as_plain_string() {
        let ty = ServiceType::new("greeter");
        assert_eq!(serde_json::to_string(&ty).unwrap(), "\"greeter\"");
        let back: ServiceType = serde_json::from_str("\"greeter\"").unwrap();
        assert_eq!(back, ty);
        assert_eq!(back.to_string(), "greeter");
    }

    #[test]
    fn descriptor_keys_are_case_sensitive() {
        let lower = ImplementationDescriptor::new("control", "ControlImpl");
        let upper = ImplementationDescriptor::new("Control", "ControlImpl");
        assert_ne!(lower, upper);
    }
}
