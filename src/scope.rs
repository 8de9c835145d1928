//! Scope identity and the guarded scope handle
//!
//! Every container node gets a [`ScopeId`]. A constructor that wants to talk to
//! its own scope takes a [`ScopeHandle`] parameter instead of a `Container`: the
//! handle refuses to resolve until the constructor has returned.

use crate::container::{Container, ScopeInner};
use crate::context::Context;
use crate::error::{DiError, Result};
use crate::key::{Tag, TypeKey};
use crate::provider::{AnyService, Injectable};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Unique scope identifier.
///
/// Each container (root or child) gets a unique ID for tracking and debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
    /// Generate a new unique scope ID.
    #[inline]
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[inline]
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

/// A scope injected into a constructor, decorator or `invoke` target.
///
/// Resolving through a handle while the constructor that received it is still
/// running fails with [`DiError::ResolveInsideConstructor`]; storing the
/// handle and resolving later is fine. `contains*` queries are always allowed.
///
/// The handle does not keep its scope alive. Once the scope is dropped,
/// resolving reports [`DiError::Closed`].
///
/// # Examples
///
/// ```rust
/// use scoped_injector::{Container, Context, ScopeHandle, Service};
/// use std::sync::Arc;
///
/// struct Config(&'static str);
///
/// struct Lazy {
///     scope: ScopeHandle,
/// }
///
/// let container = Container::new([
///     Service::value(Config("prod")).into(),
///     Service::factory(|scope: ScopeHandle| Lazy { scope }).into(),
/// ])
/// .unwrap();
///
/// let ctx = Context::background();
/// let lazy = container.resolve::<Lazy>(&ctx).unwrap();
/// let config = lazy.scope.resolve::<Config>(&ctx).unwrap();
/// assert_eq!(config.0, "prod");
/// ```
#[derive(Clone)]
pub struct ScopeHandle {
    scope: Weak<ScopeInner>,
    ready: Arc<AtomicBool>,
}

impl ScopeHandle {
    pub(crate) fn new(scope: &Arc<ScopeInner>, ready: Arc<AtomicBool>) -> Self {
        Self {
            scope: Arc::downgrade(scope),
            ready,
        }
    }

    /// Whether the constructor that received this handle has returned.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// ID of the scope behind this handle, if it still exists.
    pub fn scope_id(&self) -> Option<ScopeId> {
        self.scope.upgrade().map(|inner| inner.id())
    }

    fn guarded(&self, key: &TypeKey) -> Result<Container> {
        if !self.is_ready() {
            return Err(DiError::ResolveInsideConstructor { key: key.clone() });
        }
        self.scope
            .upgrade()
            .map(Container::from_inner)
            .ok_or(DiError::Closed)
    }

    /// Resolve a service from the scope behind this handle.
    pub fn resolve<S: ?Sized + Injectable>(&self, ctx: &Context) -> Result<Arc<S>> {
        self.guarded(&TypeKey::of::<S>())?.resolve::<S>(ctx)
    }

    /// Resolve a tagged service from the scope behind this handle.
    pub fn resolve_tagged<S: ?Sized + Injectable>(
        &self,
        ctx: &Context,
        tag: impl Into<Tag>,
    ) -> Result<Arc<S>> {
        let key = TypeKey::tagged::<S>(tag);
        let container = self.guarded(&key)?;
        container.resolve_typed::<S>(ctx, &key)
    }

    /// Resolve any key from the scope behind this handle.
    pub fn resolve_key(&self, ctx: &Context, key: &TypeKey) -> Result<AnyService> {
        self.guarded(key)?.resolve_key(ctx, key)
    }

    /// Check if a service is registered, ignoring readiness.
    pub fn contains<S: ?Sized + Injectable>(&self) -> bool {
        self.contains_key(&TypeKey::of::<S>())
    }

    /// Check if a tagged service is registered, ignoring readiness.
    pub fn contains_tagged<S: ?Sized + Injectable>(&self, tag: impl Into<Tag>) -> bool {
        self.contains_key(&TypeKey::tagged::<S>(tag))
    }

    pub fn contains_key(&self, key: &TypeKey) -> bool {
        self.scope
            .upgrade()
            .is_some_and(|inner| inner.registry().contains(key))
    }
}

impl std::fmt::Debug for ScopeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeHandle")
            .field("scope", &self.scope_id())
            .field("ready", &self.is_ready())
            .finish()
    }
}
