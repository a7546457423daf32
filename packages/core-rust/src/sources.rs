//! Read-only views of external flag and configuration systems.
//!
//! Selection modes consume these; evaluating flags or loading configuration
//! happens elsewhere. The in-memory implementations back tests and hosts that
//! push values in themselves.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

/// Source of boolean feature flags.
#[async_trait]
pub trait FeatureFlagSource: Send + Sync {
    /// Current state of `flag`, or `None` when the flag is not defined.
    async fn is_enabled(&self, flag: &str) -> anyhow::Result<Option<bool>>;
}

/// Source of configuration values addressed by path.
#[async_trait]
pub trait ConfigurationSource: Send + Sync {
    /// Value at `path`, or `None` when nothing is configured there.
    async fn value(&self, path: &str) -> anyhow::Result<Option<Value>>;
}

/// Flags held in memory and updatable at runtime.
#[derive(Debug, Default)]
pub struct InMemoryFlags {
    flags: DashMap<String, bool>,
}

impl InMemoryFlags {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, flag: impl Into<String>, enabled: bool) {
        self.flags.insert(flag.into(), enabled);
    }

    pub fn remove(&self, flag: &str) {
        self.flags.remove(flag);
    }
}

#[async_trait]
impl FeatureFlagSource for InMemoryFlags {
    async fn is_enabled(&self, flag: &str) -> anyhow::Result<Option<bool>> {
        Ok(self.flags.get(flag).map(|entry| *entry.value()))
    }
}

/// Configuration values held in memory and updatable at runtime.
#[derive(Debug, Default)]
pub struct InMemoryConfiguration {
    values: DashMap<String, Value>,
}

impl InMemoryConfiguration {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, path: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(path.into(), value.into());
    }

    pub fn remove(&self, path: &str) {
        self.values.remove(path);
    }
}

#[async_trait]
impl ConfigurationSource for InMemoryConfiguration {
    async fn value(&self, path: &str) -> anyhow::Result<Option<Value>> {
        Ok(self.values.get(path).map(|entry| entry.value().clone()))
    }
}
