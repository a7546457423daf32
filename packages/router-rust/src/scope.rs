//! Per-attempt implementation scopes.
//!
//! - [`ScopeGuard`]: owns one scope for one attempt and disposes it exactly once,
//!   including when the attempt's future is dropped mid-flight
//! - [`ImplementationCatalog`]: a simple [`ScopeFactory`] backed by a map of
//!   named constructors

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use switchyard_core::{ImplementationDescriptor, ImplementationScope, ResolveError, ScopeFactory};

// ---------------------------------------------------------------------------
// ScopeGuard
// ---------------------------------------------------------------------------

/// RAII owner of one implementation scope.
pub struct ScopeGuard<S: ?Sized + Send + Sync + 'static> {
    scope: Option<Box<dyn ImplementationScope<S>>>,
}

impl<S: ?Sized + Send + Sync + 'static> ScopeGuard<S> {
    #[must_use]
    pub fn new(scope: Box<dyn ImplementationScope<S>>) -> Self {
        Self { scope: Some(scope) }
    }

    /// Opens a fresh scope from `factory`.
    #[must_use]
    pub fn open(factory: &dyn ScopeFactory<S>) -> Self {
        Self::new(factory.create_scope())
    }

    /// Resolves `descriptor` within the guarded scope.
    ///
    /// # Errors
    ///
    /// Propagates the scope's [`ResolveError`], or [`ResolveError::Disposed`]
    /// once the guard has been disposed.
    pub async fn resolve(&mut self, descriptor: &ImplementationDescriptor) -> Result<Arc<S>, ResolveError> {
        match self.scope.as_mut() {
            Some(scope) => scope.resolve(descriptor).await,
            None => Err(ResolveError::Disposed),
        }
    }

    /// Disposes the scope now. Later calls, and the eventual drop, do nothing.
    pub fn dispose(&mut self) {
        if let Some(mut scope) = self.scope.take() {
            scope.dispose();
        }
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.scope.is_none()
    }
}

impl<S: ?Sized + Send + Sync + 'static> Drop for ScopeGuard<S> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<S: ?Sized + Send + Sync + 'static> fmt::Debug for ScopeGuard<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeGuard")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ImplementationCatalog
// ---------------------------------------------------------------------------

type Constructor<S> = Arc<dyn Fn() -> Result<Arc<S>, ResolveError> + Send + Sync>;

struct CatalogInner<S: ?Sized> {
    constructors: DashMap<String, Constructor<S>>,
    open_scopes: AtomicUsize,
}

/// Named constructors for implementations of `S`.
///
/// Each scope builds an implementation at most once and hands the same instance
/// to every resolve of that name within the scope. Cloning the catalog shares
/// its registrations.
pub struct ImplementationCatalog<S: ?Sized> {
    inner: Arc<CatalogInner<S>>,
}

impl<S: ?Sized + Send + Sync + 'static> ImplementationCatalog<S> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CatalogInner {
                constructors: DashMap::new(),
                open_scopes: AtomicUsize::new(0),
            }),
        }
    }

    /// Registers a constructor run once per scope that resolves `implementation`.
    pub fn register<F>(&self, implementation: impl Into<String>, constructor: F)
    where
        F: Fn() -> Arc<S> + Send + Sync + 'static,
    {
        self.register_fallible(implementation, move || Ok(constructor()));
    }

    /// Registers a constructor that may fail, e.g. because a dependency is missing.
    pub fn register_fallible<F>(&self, implementation: impl Into<String>, constructor: F)
    where
        F: Fn() -> Result<Arc<S>, ResolveError> + Send + Sync + 'static,
    {
        let implementation = implementation.into();
        tracing::debug!(implementation = %implementation, "implementation registered");
        self.inner.constructors.insert(implementation, Arc::new(constructor));
    }

    /// Registers a shared instance handed out to every scope.
    pub fn register_instance(&self, implementation: impl Into<String>, instance: Arc<S>) {
        self.register(implementation, move || instance.clone());
    }

    #[must_use]
    pub fn contains(&self, implementation: &str) -> bool {
        self.inner.constructors.contains_key(implementation)
    }

    /// Scopes created and not yet disposed.
    #[must_use]
    pub fn open_scopes(&self) -> usize {
        self.inner.open_scopes.load(Ordering::SeqCst)
    }
}

impl<S: ?Sized + Send + Sync + 'static> Default for ImplementationCatalog<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ?Sized> Clone for ImplementationCatalog<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: ?Sized> fmt::Debug for ImplementationCatalog<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImplementationCatalog")
            .field("implementations", &self.inner.constructors.len())
            .field("open_scopes", &self.inner.open_scopes.load(Ordering::SeqCst))
            .finish()
    }
}

impl<S: ?Sized + Send + Sync + 'static> ScopeFactory<S> for ImplementationCatalog<S> {
    fn create_scope(&self) -> Box<dyn ImplementationScope<S>> {
        self.inner.open_scopes.fetch_add(1, Ordering::SeqCst);
        Box::new(CatalogScope {
            catalog: Arc::clone(&self.inner),
            resolved: HashMap::new(),
            disposed: false,
        })
    }
}

/// Scope created by [`ImplementationCatalog`].
struct CatalogScope<S: ?Sized> {
    catalog: Arc<CatalogInner<S>>,
    resolved: HashMap<String, Arc<S>>,
    disposed: bool,
}

#[async_trait]
impl<S: ?Sized + Send + Sync + 'static> ImplementationScope<S> for CatalogScope<S> {
    async fn resolve(&mut self, descriptor: &ImplementationDescriptor) -> Result<Arc<S>, ResolveError> {
        if self.disposed {
            return Err(ResolveError::Disposed);
        }
        if let Some(instance) = self.resolved.get(&descriptor.implementation) {
            return Ok(Arc::clone(instance));
        }

        let constructor = self
            .catalog
            .constructors
            .get(&descriptor.implementation)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ResolveError::Unregistered {
                implementation: descriptor.implementation.clone(),
            })?;
        let instance = constructor()?;
        self.resolved
            .insert(descriptor.implementation.clone(), Arc::clone(&instance));
        Ok(instance)
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.resolved.clear();
        self.catalog.open_scopes.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<S: ?Sized> Drop for CatalogScope<S> {
    fn drop(&mut self) {
        if !self.disposed {
            self.disposed = true;
            self.catalog.open_scopes.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
