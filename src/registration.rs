//! Registration directives
//!
//! [`Service`] and [`Decorator`] describe what to register; both convert into
//! an opaque [`Registration`] that is applied to a [`ContainerBuilder`].
//! Problems found while describing a registration are collected, not raised,
//! so one `Container::new` call reports every problem at once.

use crate::closer::{Close, CloseFn, CloserFactory};
use crate::container::ContainerBuilder;
use crate::context::Context;
use crate::descriptor::{
    ConstructFn, DecoratorDescriptor, DescriptorKind, ProjectFn, ServiceDescriptor, SliceView,
    TransformFn,
};
use crate::error::{DiError, ValidationError};
use crate::factory::{Constructor, DecoratorFn, TryConstructor, TryDecoratorFn};
use crate::key::{Tag, TypeKey};
use crate::provider::{erase, unerase, AnyService, Injectable, Lifetime};
use crate::scope::ScopeHandle;
use std::marker::PhantomData;
use std::sync::Arc;

/// An opaque registration directive, applied to the container being built.
pub struct Registration {
    apply: Box<dyn FnOnce(&mut ContainerBuilder) + Send>,
}

impl Registration {
    fn new(apply: impl FnOnce(&mut ContainerBuilder) + Send + 'static) -> Self {
        Self {
            apply: Box::new(apply),
        }
    }

    #[inline]
    pub(crate) fn apply(self, builder: &mut ContainerBuilder) {
        (self.apply)(builder)
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration").finish_non_exhaustive()
    }
}

/// One key type a descriptor is bound under.
pub(crate) struct ServiceView {
    pub(crate) projection: Option<ProjectFn>,
    pub(crate) slice: SliceView,
}

enum Source {
    Value(AnyService),
    Function {
        construct: ConstructFn,
        dependencies: Vec<TypeKey>,
    },
}

/// A service registration for type `T`.
///
/// # Examples
///
/// ```rust
/// use scoped_injector::{Container, Context, Service};
/// use std::sync::Arc;
///
/// trait Store: Send + Sync {
///     fn get(&self) -> u32;
/// }
///
/// struct Config { answer: u32 }
/// struct Memory { answer: u32 }
///
/// impl Store for Memory {
///     fn get(&self) -> u32 { self.answer }
/// }
///
/// let container = Container::new([
///     Service::value(Config { answer: 42 }).into(),
///     Service::factory(|config: Arc<Config>| Memory { answer: config.answer })
///         .alias::<dyn Store>(|memory| memory)
///         .into(),
/// ])
/// .unwrap();
///
/// let store = container.resolve::<dyn Store>(&Context::background()).unwrap();
/// assert_eq!(store.get(), 42);
/// ```
#[must_use = "a Service does nothing until it is registered"]
pub struct Service<T: ?Sized + Injectable> {
    source: Source,
    lifetime: Lifetime,
    tag: Option<Tag>,
    aliases: Vec<ServiceView>,
    closer: Option<CloserFactory>,
    errors: Vec<ValidationError>,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: Injectable> Service<T> {
    /// Register a fixed value. Values are never decorated and are only
    /// closed when [`closeable`](Self::closeable) or
    /// [`close_with`](Self::close_with) opts in.
    pub fn value(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Register a constructor; its parameters are the dependencies.
    pub fn factory<F, Args>(constructor: F) -> Self
    where
        F: Constructor<T, Args>,
    {
        let construct: ConstructFn = Arc::new(move |args: &[AnyService]| {
            Constructor::construct(&constructor, args).map(|service| erase(Arc::new(service)))
        });
        Self::with_source(Source::Function {
            construct,
            dependencies: F::dependencies(),
        })
    }

    /// Register a fallible constructor. Its error is reported unchanged as
    /// [`DiError::Constructor`].
    pub fn try_factory<F, E, Args>(constructor: F) -> Self
    where
        F: TryConstructor<T, E, Args>,
    {
        let construct: ConstructFn = Arc::new(move |args: &[AnyService]| {
            TryConstructor::construct(&constructor, args).map(|service| erase(Arc::new(service)))
        });
        Self::with_source(Source::Function {
            construct,
            dependencies: F::dependencies(),
        })
    }
}

impl<T: ?Sized + Injectable> Service<T> {
    /// Register an already shared value, including trait objects.
    pub fn from_arc(value: Arc<T>) -> Self {
        Self::with_source(Source::Value(erase(value)))
    }

    fn with_source(source: Source) -> Self {
        let produced = TypeKey::of::<T>();
        Self {
            source,
            lifetime: Lifetime::default(),
            tag: None,
            aliases: Vec::new(),
            closer: None,
            errors: unsupported(&produced).into_iter().collect(),
            _marker: PhantomData,
        }
    }

    /// Set the lifetime; services default to singletons.
    pub fn lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// One instance per registering scope.
    pub fn singleton(self) -> Self {
        self.lifetime(Lifetime::Singleton)
    }

    /// One instance per child scope.
    pub fn scoped(self) -> Self {
        self.lifetime(Lifetime::Scoped)
    }

    /// A fresh instance for every resolution.
    pub fn transient(self) -> Self {
        self.lifetime(Lifetime::Transient)
    }

    /// Bind under the tagged key instead of the untagged one.
    pub fn tag(mut self, tag: impl Into<Tag>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Also expose the service as `A`.
    ///
    /// Once any alias is declared the service is only bound under its
    /// aliases. Every alias shares the one constructed instance.
    pub fn alias<A: ?Sized + Injectable>(
        mut self,
        cast: impl Fn(Arc<T>) -> Arc<A> + Send + Sync + 'static,
    ) -> Self {
        let alias = TypeKey::of::<A>();
        let service = std::any::type_name::<T>();

        if alias == TypeKey::of::<T>() {
            self.errors.push(ValidationError::RedundantAlias {
                service,
                alias: alias.type_name(),
            });
        } else if self.aliases.iter().any(|view| view.slice.item == alias) {
            self.errors.push(ValidationError::DuplicateAlias {
                service,
                alias: alias.type_name(),
            });
        } else if let Some(err) = unsupported(&alias) {
            self.errors.push(err);
        } else {
            let projection: ProjectFn = Arc::new(move |instance: &AnyService| {
                unerase::<T>(instance).map(|service| erase(cast(service)))
            });
            self.aliases.push(ServiceView {
                projection: Some(projection),
                slice: SliceView::of::<A>(),
            });
        }
        self
    }

    /// Resolve the first untagged constructor parameter of type `D` under `tag`.
    pub fn dep_tag<D: ?Sized + Injectable>(mut self, tag: impl Into<Tag>) -> Self {
        let parameter = TypeKey::of::<D>();
        let tag = tag.into();

        let slot = match &mut self.source {
            Source::Function { dependencies, .. } => {
                dependencies.iter_mut().find(|dep| **dep == parameter)
            }
            Source::Value(_) => None,
        };
        match slot {
            Some(dep) => *dep = parameter.with_tag(tag),
            None => self.errors.push(ValidationError::UnknownParameter {
                service: std::any::type_name::<T>(),
                parameter: parameter.type_name(),
                tag: tag.to_string(),
            }),
        }
        self
    }

    /// Close produced instances with `close`, which may take any of the
    /// shapes accepted by [`CloseFn`].
    pub fn close_with<F, Shape>(mut self, close: F) -> Self
    where
        F: CloseFn<T, Shape>,
        Shape: 'static,
    {
        self.closer = Some(CloserFactory::from_fn::<T, F, Shape>(close));
        self
    }

    /// Never close produced instances.
    pub fn no_close(mut self) -> Self {
        self.closer = None;
        self
    }

    /// Close produced instances through their [`Close`] implementation.
    pub fn closeable(mut self) -> Self
    where
        T: Close,
    {
        self.closer = Some(CloserFactory::from_close::<T>());
        self
    }

    fn register(self, builder: &mut ContainerBuilder) {
        if !self.errors.is_empty() {
            self.errors.into_iter().for_each(|err| builder.reject(err));
            return;
        }

        let (kind, dependencies) = match self.source {
            Source::Value(value) => (DescriptorKind::Value(value), Vec::new()),
            Source::Function {
                construct,
                dependencies,
            } => (DescriptorKind::Function(construct), dependencies),
        };
        let descriptor = Arc::new(ServiceDescriptor::new(
            TypeKey::of::<T>(),
            self.lifetime,
            dependencies,
            kind,
            self.closer,
        ));

        let views = if self.aliases.is_empty() {
            vec![ServiceView {
                projection: None,
                slice: SliceView::of::<T>(),
            }]
        } else {
            self.aliases
        };
        builder.bind_service(descriptor, self.tag, views);
    }
}

impl<T: ?Sized + Injectable> From<Service<T>> for Registration {
    fn from(service: Service<T>) -> Self {
        Registration::new(move |builder| service.register(builder))
    }
}

/// A decorator for the service bound under `S` (or a tagged `S`).
///
/// The first parameter is the value produced so far; decorators for the same
/// key run in registration order.
///
/// ```rust
/// use scoped_injector::{Container, Context, Decorator, Service};
/// use std::sync::Arc;
///
/// struct Greeting(String);
///
/// let container = Container::new([
///     Service::factory(|| Greeting("hello".into())).into(),
///     Decorator::new(|g: Arc<Greeting>| Arc::new(Greeting(format!("{}!", g.0)))).into(),
/// ])
/// .unwrap();
///
/// let greeting = container.resolve::<Greeting>(&Context::background()).unwrap();
/// assert_eq!(greeting.0, "hello!");
/// ```
#[must_use = "a Decorator does nothing until it is registered"]
pub struct Decorator<S: ?Sized + Injectable> {
    target: TypeKey,
    dependencies: Vec<TypeKey>,
    transform: TransformFn,
    _marker: PhantomData<fn() -> Arc<S>>,
}

impl<S: ?Sized + Injectable> Decorator<S> {
    pub fn new<F, Args>(decorator: F) -> Self
    where
        F: DecoratorFn<S, Args>,
    {
        let transform: TransformFn = Arc::new(move |value: AnyService, args: &[AnyService]| {
            let target = unerase::<S>(&value).ok_or_else(|| DiError::TypeMismatch {
                key: TypeKey::of::<S>(),
            })?;
            DecoratorFn::decorate(&decorator, target, args).map(erase)
        });
        Self::with_transform(F::dependencies(), transform)
    }

    pub fn try_new<F, E, Args>(decorator: F) -> Self
    where
        F: TryDecoratorFn<S, E, Args>,
    {
        let transform: TransformFn = Arc::new(move |value: AnyService, args: &[AnyService]| {
            let target = unerase::<S>(&value).ok_or_else(|| DiError::TypeMismatch {
                key: TypeKey::of::<S>(),
            })?;
            TryDecoratorFn::decorate(&decorator, target, args).map(erase)
        });
        Self::with_transform(F::dependencies(), transform)
    }

    fn with_transform(dependencies: Vec<TypeKey>, transform: TransformFn) -> Self {
        Self {
            target: TypeKey::of::<S>(),
            dependencies,
            transform,
            _marker: PhantomData,
        }
    }

    /// Decorate the tagged registration instead of the untagged one.
    pub fn tag(mut self, tag: impl Into<Tag>) -> Self {
        self.target = self.target.with_tag(tag);
        self
    }

    fn register(self, builder: &mut ContainerBuilder) {
        if self.dependencies.contains(&self.target) {
            builder.reject(ValidationError::DecoratorSelfDependency {
                target: self.target.to_string(),
            });
            return;
        }
        builder.bind_decorator(Arc::new(DecoratorDescriptor {
            target: self.target,
            dependencies: self.dependencies,
            transform: self.transform,
        }));
    }
}

impl<S: ?Sized + Injectable> From<Decorator<S>> for Registration {
    fn from(decorator: Decorator<S>) -> Self {
        Registration::new(move |builder| decorator.register(builder))
    }
}

/// Types that are injected by the engine and can never be produced.
fn unsupported(key: &TypeKey) -> Option<ValidationError> {
    let reason = if *key == TypeKey::of::<Context>() {
        "the ambient context is injected, not registered"
    } else if *key == TypeKey::of::<ScopeHandle>() {
        "scope handles are injected, not registered"
    } else {
        return None;
    };
    Some(ValidationError::UnsupportedKind {
        type_name: key.type_name(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;

    struct Db;
    struct Repo;

    trait Named: Send + Sync {}
    impl Named for Repo {}

    fn validation_errors(result: crate::Result<Container>) -> Vec<ValidationError> {
        match result {
            Err(DiError::Validation(errors)) => errors,
            other => panic!("expected validation errors, got {other:?}"),
        }
    }

    #[test]
    fn test_marker_types_cannot_be_registered() {
        let errors = validation_errors(Container::new([
            Service::value(Context::background()).into(),
            Service::factory(|scope: ScopeHandle| scope).into(),
        ]));

        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|err| matches!(err, ValidationError::UnsupportedKind { .. })));
    }

    #[test]
    fn test_alias_validation() {
        let errors = validation_errors(Container::new([Service::factory(|| Repo)
            .alias::<Repo>(|repo| repo)
            .alias::<dyn Named>(|repo| repo)
            .alias::<dyn Named>(|repo| repo)
            .into()]));

        assert!(matches!(errors[0], ValidationError::RedundantAlias { .. }));
        assert!(matches!(errors[1], ValidationError::DuplicateAlias { .. }));
    }

    #[test]
    fn test_dep_tag_must_name_a_parameter() {
        let errors = validation_errors(Container::new([
            Service::factory(|_db: Arc<Db>| Repo).dep_tag::<Repo>("x").into(),
            Service::value(Db).dep_tag::<Db>("y").into(),
        ]));

        assert_eq!(errors.len(), 2);
        match &errors[0] {
            ValidationError::UnknownParameter { tag, .. } => assert_eq!(tag, "x"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decorator_cannot_depend_on_target() {
        let errors = validation_errors(Container::new([
            Service::value(Db).into(),
            Decorator::new(|db: Arc<Db>, _again: Arc<Db>| db).into(),
        ]));

        assert_eq!(
            errors,
            vec![ValidationError::DecoratorSelfDependency {
                target: TypeKey::of::<Db>().to_string(),
            }]
        );
    }

    #[test]
    fn test_tagged_decorator_may_depend_on_untagged() {
        let container = Container::new([
            Service::value(Db).into(),
            Service::value(Db).tag("replica").into(),
            Decorator::new(|replica: Arc<Db>, _primary: Arc<Db>| replica)
                .tag("replica")
                .into(),
        ]);
        assert!(container.is_ok());
    }
}
