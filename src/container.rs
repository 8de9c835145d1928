//! Dependency injection container
//!
//! A [`Container`] is one node in a tree of scopes. It combines a frozen
//! registry, a per-scope resolution cache and the closers of everything it
//! produced. Containers are built in one step from a list of registrations and
//! cannot be modified afterwards; child scopes add registrations of their own.

use crate::closer::{close_all, Closer, CloserRegistry};
use crate::context::Context;
use crate::descriptor::{DecoratorDescriptor, DescriptorKind, ServiceDescriptor};
use crate::error::{DiError, Result, ValidationError};
use crate::key::{Tag, TypeKey};
use crate::provider::{unerase, AnyService, Injectable};
use crate::registration::{Registration, ServiceView};
use crate::resolve::{self, CacheCell, CacheKey};
use crate::scope::ScopeId;
use crate::storage::{Binding, Registry, RegistryCow};
use ahash::RandomState;
use dashmap::DashMap;
use std::sync::{Arc, PoisonError, RwLock};

#[cfg(feature = "logging")]
use tracing::{debug, warn};

// =============================================================================
// Scope state
// =============================================================================

pub(crate) struct ScopeInner {
    pub(crate) id: ScopeId,
    pub(crate) depth: u32,
    pub(crate) parent: Option<Arc<ScopeInner>>,
    pub(crate) registry: Arc<Registry>,
    pub(crate) owns_registry: bool,
    pub(crate) cache: DashMap<CacheKey, CacheCell, RandomState>,
    pub(crate) closers: CloserRegistry,
    /// Shared for resolution and closer appends, exclusive while closing.
    pub(crate) closed: RwLock<bool>,
}

impl ScopeInner {
    #[inline]
    pub(crate) fn id(&self) -> ScopeId {
        self.id
    }

    #[inline]
    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }

    pub(crate) fn is_closed(&self) -> bool {
        *self.closed.read().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(DiError::Closed)
        } else {
            Ok(())
        }
    }

    /// This scope or the ancestor with the given id.
    pub(crate) fn ancestor(self: &Arc<Self>, id: ScopeId) -> Option<Arc<ScopeInner>> {
        let mut current = Some(self);
        while let Some(scope) = current {
            if scope.id == id {
                return Some(Arc::clone(scope));
            }
            current = scope.parent.as_ref();
        }
        None
    }

    /// Append a closer unless the scope is already closing; then it is handed back.
    pub(crate) fn push_closer(
        &self,
        key: TypeKey,
        closer: Closer,
    ) -> std::result::Result<(), Closer> {
        let closed = self.closed.read().unwrap_or_else(PoisonError::into_inner);
        if *closed {
            return Err(closer);
        }
        self.closers.push(key, closer);
        Ok(())
    }
}

#[cfg(feature = "logging")]
impl Drop for ScopeInner {
    fn drop(&mut self) {
        let closed = *self.closed.get_mut().unwrap_or_else(PoisonError::into_inner);
        let pending = self.closers.len();
        if !closed && pending > 0 {
            warn!(
                target: "scoped_injector",
                scope_id = self.id.id(),
                pending_closers = pending,
                "Scope dropped without being closed"
            );
        }
    }
}

// =============================================================================
// Container
// =============================================================================

/// A dependency injection scope.
///
/// Cloning is cheap and yields another handle to the same scope.
///
/// # Examples
///
/// ```rust
/// use scoped_injector::{Container, Context, Service};
/// use std::sync::Arc;
///
/// struct Database { url: String }
/// struct UserRepository { db: Arc<Database> }
/// struct Request { id: u32 }
///
/// let root = Container::new([
///     Service::value(Database { url: "postgres://localhost".into() }).into(),
///     Service::factory(|db: Arc<Database>| UserRepository { db }).into(),
/// ])
/// .unwrap();
///
/// let request = root
///     .new_scope([Service::value(Request { id: 7 }).into()])
///     .unwrap();
///
/// let ctx = Context::background();
/// let repo = request.resolve::<UserRepository>(&ctx).unwrap();
/// assert_eq!(repo.db.url, "postgres://localhost");
/// assert_eq!(request.resolve::<Request>(&ctx).unwrap().id, 7);
/// assert!(root.resolve::<Request>(&ctx).is_err());
///
/// request.close(&ctx).unwrap();
/// root.close(&ctx).unwrap();
/// ```
#[derive(Clone)]
pub struct Container {
    pub(crate) inner: Arc<ScopeInner>,
}

impl Container {
    /// Build a root container from an ordered list of registrations.
    ///
    /// Every validation problem across all registrations is reported in one
    /// [`DiError::Validation`].
    pub fn new(registrations: impl IntoIterator<Item = Registration>) -> Result<Self> {
        Self::builder().register_all(registrations).build()
    }

    /// Fluent builder for a root container.
    #[inline]
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::root()
    }

    /// Build a child scope with additional registrations.
    ///
    /// Fails with [`DiError::Closed`] if this scope is closed.
    pub fn new_scope(&self, registrations: impl IntoIterator<Item = Registration>) -> Result<Self> {
        self.scope_builder().register_all(registrations).build()
    }

    /// Fluent builder for a child scope.
    #[inline]
    pub fn scope_builder(&self) -> ContainerBuilder {
        ContainerBuilder::child(Arc::clone(&self.inner))
    }

    #[inline]
    pub(crate) fn from_inner(inner: Arc<ScopeInner>) -> Self {
        Self { inner }
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve the untagged registration of `S`.
    #[inline]
    pub fn resolve<S: ?Sized + Injectable>(&self, ctx: &Context) -> Result<Arc<S>> {
        self.resolve_typed::<S>(ctx, &TypeKey::of::<S>())
    }

    /// Resolve the registration of `S` under `tag`.
    ///
    /// There is no fallback to the untagged registration.
    #[inline]
    pub fn resolve_tagged<S: ?Sized + Injectable>(
        &self,
        ctx: &Context,
        tag: impl Into<Tag>,
    ) -> Result<Arc<S>> {
        self.resolve_typed::<S>(ctx, &TypeKey::tagged::<S>(tag))
    }

    /// Resolve every registration of `S`, in registration order.
    pub fn resolve_all<S: ?Sized + Injectable>(&self, ctx: &Context) -> Result<Vec<Arc<S>>> {
        self.resolve::<Vec<Arc<S>>>(ctx).map(|all| Vec::clone(&all))
    }

    /// Resolve a key without static typing.
    ///
    /// The value holds an `Arc<S>` for the key's type `S`; recover it with
    /// `value.downcast_ref::<Arc<S>>()`.
    pub fn resolve_key(&self, ctx: &Context, key: &TypeKey) -> Result<AnyService> {
        resolve::resolve(&self.inner, ctx, key, &mut Vec::new())
    }

    /// Resolve `S`, panicking on failure.
    ///
    /// The panic payload is the [`DiError`] itself, so it can be recovered with
    /// `std::panic::catch_unwind` and downcast.
    pub fn must_resolve<S: ?Sized + Injectable>(&self, ctx: &Context) -> Arc<S> {
        match self.resolve::<S>(ctx) {
            Ok(service) => service,
            Err(err) => std::panic::panic_any(err),
        }
    }

    pub(crate) fn resolve_typed<S: ?Sized + Injectable>(
        &self,
        ctx: &Context,
        key: &TypeKey,
    ) -> Result<Arc<S>> {
        let value = self.resolve_key(ctx, key)?;
        unerase::<S>(&value).ok_or_else(|| DiError::TypeMismatch { key: key.clone() })
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Check if `S` is registered in this scope or an ancestor.
    #[inline]
    pub fn contains<S: ?Sized + Injectable>(&self) -> bool {
        self.contains_key(&TypeKey::of::<S>())
    }

    /// Check if `S` is registered under `tag` in this scope or an ancestor.
    #[inline]
    pub fn contains_tagged<S: ?Sized + Injectable>(&self, tag: impl Into<Tag>) -> bool {
        self.contains_key(&TypeKey::tagged::<S>(tag))
    }

    /// Check if `key` is registered in this scope or an ancestor.
    #[inline]
    pub fn contains_key(&self, key: &TypeKey) -> bool {
        self.inner.registry.contains(key)
    }

    /// Number of addressable keys, including inherited ones.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.registry.len()
    }

    /// Check if nothing is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Addressable keys, including inherited ones, in no particular order.
    pub fn registered_keys(&self) -> Vec<TypeKey> {
        self.inner.registry.keys().cloned().collect()
    }

    /// Identifier of this scope, unique within the process.
    #[inline]
    pub fn id(&self) -> ScopeId {
        self.inner.id
    }

    /// Number of ancestors; the root has depth 0.
    #[inline]
    pub fn depth(&self) -> u32 {
        self.inner.depth
    }

    /// Whether this scope copied its parent's registry to add its own entries.
    #[inline]
    pub fn owns_registry(&self) -> bool {
        self.inner.owns_registry
    }

    /// Whether [`close`](Self::close) has been called on this scope.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close this scope, running its closers newest first.
    ///
    /// Every closer runs even if an earlier one fails; all failures are
    /// returned together. Closing twice fails with [`DiError::Closed`] and runs
    /// nothing. Child scopes and ancestors are not closed.
    pub fn close(&self, ctx: &Context) -> Result<()> {
        let closers = {
            let mut closed = self
                .inner
                .closed
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if *closed {
                return Err(DiError::Closed);
            }
            *closed = true;
            self.inner.closers.drain()
        };

        #[cfg(feature = "logging")]
        debug!(
            target: "scoped_injector",
            scope_id = self.inner.id.id(),
            depth = self.inner.depth,
            closers = closers.len(),
            "Closing scope"
        );

        let errors = close_all(closers, ctx);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DiError::Close(errors))
        }
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.inner.id)
            .field("depth", &self.inner.depth)
            .field("parent", &self.inner.parent.as_ref().map(|parent| parent.id))
            .field("service_count", &self.len())
            .field("owns_registry", &self.inner.owns_registry)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Fluent builder for a [`Container`].
///
/// ```rust
/// use scoped_injector::{Container, Context, Service};
///
/// struct Config;
///
/// let container = Container::builder()
///     .register(Service::value(Config))
///     .build()
///     .unwrap();
/// assert!(container.contains::<Config>());
/// ```
pub struct ContainerBuilder {
    id: ScopeId,
    parent: Option<Arc<ScopeInner>>,
    registry: RegistryCow,
    errors: Vec<ValidationError>,
    value_closers: Vec<(TypeKey, Closer)>,
    #[cfg(feature = "logging")]
    count: usize,
}

impl ContainerBuilder {
    fn root() -> Self {
        Self::with_registry(None, RegistryCow::Owned(Registry::default()))
    }

    fn child(parent: Arc<ScopeInner>) -> Self {
        let registry = RegistryCow::Borrowed(Arc::clone(&parent.registry));
        Self::with_registry(Some(parent), registry)
    }

    fn with_registry(parent: Option<Arc<ScopeInner>>, registry: RegistryCow) -> Self {
        Self {
            id: ScopeId::next(),
            parent,
            registry,
            errors: Vec::new(),
            value_closers: Vec::new(),
            #[cfg(feature = "logging")]
            count: 0,
        }
    }

    /// Apply one registration and continue the chain.
    pub fn register(mut self, registration: impl Into<Registration>) -> Self {
        registration.into().apply(&mut self);
        self
    }

    /// Apply registrations in order.
    pub fn register_all(mut self, registrations: impl IntoIterator<Item = Registration>) -> Self {
        for registration in registrations {
            registration.apply(&mut self);
        }
        self
    }

    pub(crate) fn reject(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub(crate) fn bind_service(
        &mut self,
        descriptor: Arc<ServiceDescriptor>,
        tag: Option<Tag>,
        views: Vec<ServiceView>,
    ) {
        for view in views {
            let key = match &tag {
                Some(tag) => view.slice.item.clone().with_tag(tag.clone()),
                None => view.slice.item.clone(),
            };
            let binding = Binding {
                descriptor: Arc::clone(&descriptor),
                registered: key.clone(),
                owner: self.id,
                projection: view.projection,
            };
            if let Err(err) = self.registry.to_mut().bind(key, &view.slice, binding) {
                self.errors.push(err);
            }
        }

        if let (DescriptorKind::Value(value), Some(closer)) = (&descriptor.kind, &descriptor.closer)
        {
            if let Some(closer) = closer.bind(value) {
                self.value_closers.push((descriptor.produced.clone(), closer));
            }
        }

        #[cfg(feature = "logging")]
        {
            self.count += 1;
            debug!(
                target: "scoped_injector",
                service = %descriptor.produced,
                lifetime = descriptor.lifetime.as_str(),
                tag = ?tag,
                scope_id = self.id.id(),
                "Registering service"
            );
        }
    }

    pub(crate) fn bind_decorator(&mut self, decorator: Arc<DecoratorDescriptor>) {
        #[cfg(feature = "logging")]
        debug!(
            target: "scoped_injector",
            target_service = %decorator.target,
            scope_id = self.id.id(),
            "Registering decorator"
        );

        self.registry.to_mut().decorate(decorator);
    }

    /// Build the container, failing with every collected validation error.
    pub fn build(self) -> Result<Container> {
        if let Some(parent) = &self.parent {
            parent.ensure_open()?;
        }
        if !self.errors.is_empty() {
            return Err(DiError::Validation(self.errors));
        }

        let (registry, owns_registry) = self.registry.freeze();
        let inner = ScopeInner {
            id: self.id,
            depth: self.parent.as_ref().map_or(0, |parent| parent.depth + 1),
            parent: self.parent,
            registry,
            owns_registry,
            cache: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
            closers: CloserRegistry::default(),
            closed: RwLock::new(false),
        };
        for (key, closer) in self.value_closers {
            inner.closers.push(key, closer);
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "scoped_injector",
            scope_id = inner.id.id(),
            depth = inner.depth,
            parent_id = ?inner.parent.as_ref().map(|parent| parent.id.id()),
            registrations = self.count,
            owns_registry = inner.owns_registry,
            "Created container"
        );

        Ok(Container {
            inner: Arc::new(inner),
        })
    }
}

impl std::fmt::Debug for ContainerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerBuilder")
            .field("id", &self.id)
            .field("parent", &self.parent.as_ref().map(|parent| parent.id))
            .field("owns_registry", &self.registry.is_owned())
            .field("errors", &self.errors)
            .finish()
    }
}
