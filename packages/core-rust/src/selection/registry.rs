use std::sync::Arc;

use dashmap::DashMap;

use super::{
    modes, BooleanFlagProvider, ConfigurationValueProvider, RandomProvider, SelectionModeProvider,
};
use crate::sources::{ConfigurationSource, FeatureFlagSource};

// ---------------------------------------------------------------------------
// SelectionModeRegistry
// ---------------------------------------------------------------------------

/// Registry of selection modes keyed by mode identifier.
///
/// A registry is an ordinary value handed to each proxy at construction, so
/// tests and independent configurations never share state. Extension packages
/// populate it with [`register`](Self::register); later registrations replace
/// earlier ones under the same identifier.
#[derive(Default)]
pub struct SelectionModeRegistry {
    providers: DashMap<String, Arc<dyn SelectionModeProvider>>,
}

impl SelectionModeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            providers: DashMap::new(),
        }
    }

    /// Creates a registry holding the built-in modes:
    /// [`modes::BOOLEAN_FLAG`], [`modes::CONFIGURATION_VALUE`], and [`modes::RANDOM`].
    #[must_use]
    pub fn with_defaults(
        flags: Arc<dyn FeatureFlagSource>,
        config: Arc<dyn ConfigurationSource>,
    ) -> Self {
        let registry = Self::new();
        registry.register(modes::BOOLEAN_FLAG, BooleanFlagProvider::new(flags));
        registry.register(modes::CONFIGURATION_VALUE, ConfigurationValueProvider::new(config));
        registry.register(modes::RANDOM, RandomProvider);
        registry
    }

    /// Register a provider under `mode`.
    pub fn register<P: SelectionModeProvider + 'static>(&self, mode: impl Into<String>, provider: P) {
        self.register_arc(mode, Arc::new(provider));
    }

    /// Register an already shared provider under `mode`.
    pub fn register_arc(&self, mode: impl Into<String>, provider: Arc<dyn SelectionModeProvider>) {
        let mode = mode.into();
        tracing::debug!(mode = %mode, "selection mode registered");
        self.providers.insert(mode, provider);
    }

    /// Retrieve a provider by its mode identifier.
    pub fn get(&self, mode: &str) -> Option<Arc<dyn SelectionModeProvider>> {
        self.providers.get(mode).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn contains(&self, mode: &str) -> bool {
        self.providers.contains_key(mode)
    }

    /// Registered mode identifiers, sorted.
    #[must_use]
    pub fn modes(&self) -> Vec<String> {
        let mut modes: Vec<String> = self.providers.iter().map(|entry| entry.key().clone()).collect();
        modes.sort();
        modes
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
