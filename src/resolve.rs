//! Resolution engine
//!
//! Resolving a key walks the registry view of the calling scope, picks the
//! scope the value belongs to, resolves dependencies depth first and then
//! constructs, projects and decorates the value.
//!
//! Cache entries are once-cells, so for any cached key exactly one caller runs
//! the constructor and everybody else waits for its result (success or error).
//! No once-cell is held while dependencies are resolved; only the constructor
//! and the decorators run inside one.
//!
//! Construction is memoized per descriptor and the projected, decorated value
//! per registration key, so aliases of one registration share the same
//! instance and a slice item is the very value its registration key yields.

use crate::container::ScopeInner;
use crate::context::Context;
use crate::descriptor::{DecoratorDescriptor, DescriptorKind, ServiceDescriptor};
use crate::error::{DiError, Result};
use crate::key::TypeKey;
use crate::provider::{markers, AnyService, Lifetime};
use crate::scope::ScopeHandle;
use crate::storage::Binding;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "logging")]
use tracing::{trace, warn};

/// Identifies a memoized value within one scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum CacheKey {
    /// The constructed instance of a descriptor.
    Instance(u64),
    /// The value handed out for a registration key, after projection and
    /// decoration.
    View(u64, TypeKey),
}

pub(crate) type CacheCell = Arc<OnceCell<Result<AnyService>>>;

impl ScopeInner {
    fn cached(&self, key: &CacheKey) -> Option<Result<AnyService>> {
        self.cache.get(key).and_then(|cell| cell.get().cloned())
    }

    fn is_memoized(&self, key: &CacheKey) -> bool {
        self.cache.get(key).is_some_and(|cell| cell.get().is_some())
    }

    /// Run `init` at most once for `key`; every caller gets the same result.
    fn memoize(&self, key: CacheKey, init: impl FnOnce() -> Result<AnyService>) -> Result<AnyService> {
        // Clone the cell out so the map shard is not locked while `init` runs.
        let cell = Arc::clone(&self.cache.entry(key).or_default());
        cell.get_or_init(init).clone()
    }
}

/// A decorator together with its resolved dependencies.
struct Stage {
    decorator: Arc<DecoratorDescriptor>,
    values: Vec<AnyService>,
    ready: Arc<AtomicBool>,
}

struct Inputs {
    dependencies: Vec<AnyService>,
    ready: Arc<AtomicBool>,
    stages: Vec<Stage>,
}

/// Resolve `key` as seen from `scope`.
///
/// `stack` holds the keys currently being resolved on this call path.
pub(crate) fn resolve(
    scope: &Arc<ScopeInner>,
    ctx: &Context,
    key: &TypeKey,
    stack: &mut Vec<TypeKey>,
) -> Result<AnyService> {
    ctx.check()?;
    scope.ensure_open()?;

    let binding = scope
        .registry
        .get(key)
        .cloned()
        .ok_or_else(|| DiError::not_registered(key.clone()))?;
    let descriptor = Arc::clone(&binding.descriptor);

    if let DescriptorKind::Value(value) = &descriptor.kind {
        return binding.project(key, Arc::clone(value));
    }

    let scope = effective_scope(scope, key, &binding)?;
    let cached = descriptor.lifetime.is_cached();
    let view = CacheKey::View(descriptor.id, binding.registered.clone());

    if cached {
        if let Some(hit) = scope.cached(&view) {
            #[cfg(feature = "logging")]
            trace!(
                target: "scoped_injector",
                service = %key,
                scope_id = scope.id.id(),
                "Service resolved from cache"
            );

            return hit;
        }
    }

    if let Some(start) = stack.iter().position(|active| active == key) {
        let mut chain = stack[start..].to_vec();
        chain.push(key.clone());
        return Err(DiError::Cycle { chain });
    }

    stack.push(key.clone());
    let inputs = resolve_inputs(&scope, ctx, key, &binding, cached, stack);
    stack.pop();
    let Inputs {
        dependencies,
        ready,
        stages,
    } = inputs?;

    // An alias projects the instance to another type, so its closer keeps the
    // constructed instance. Otherwise the closer takes the decorated value.
    let close_raw = binding.projection.is_some();
    let build = || construct(&scope, ctx, &descriptor, &dependencies, &ready, close_raw);
    let instance = if cached {
        scope.memoize(CacheKey::Instance(descriptor.id), build)
    } else {
        build()
    }?;

    let finish = || {
        let value = decorate(key, &binding, Arc::clone(&instance), stages)?;
        if !close_raw {
            let subject = match &descriptor.closer {
                Some(factory) if factory.bind(&value).is_none() => &instance,
                _ => &value,
            };
            attach_closer(&scope, ctx, &descriptor, subject)?;
        }
        Ok(value)
    };
    if cached {
        scope.memoize(view, finish)
    } else {
        finish()
    }
}

/// Resolve one constructor, decorator or `invoke` parameter.
///
/// The ambient context and the scope handle are injected here; they are never
/// looked up in the registry.
pub(crate) fn resolve_parameter(
    scope: &Arc<ScopeInner>,
    ctx: &Context,
    key: &TypeKey,
    stack: &mut Vec<TypeKey>,
    ready: &Arc<AtomicBool>,
) -> Result<AnyService> {
    if *key == markers::context() {
        return Ok(Arc::new(ctx.clone()));
    }
    if *key == markers::scope() {
        return Ok(Arc::new(ScopeHandle::new(scope, Arc::clone(ready))));
    }
    resolve(scope, ctx, key, stack)
}

/// The scope whose cache and closers a resolution uses.
fn effective_scope(
    scope: &Arc<ScopeInner>,
    key: &TypeKey,
    binding: &Binding,
) -> Result<Arc<ScopeInner>> {
    match binding.descriptor.lifetime {
        Lifetime::Singleton => {
            let owner = scope
                .ancestor(binding.owner)
                .ok_or_else(|| DiError::not_registered(key.clone()))?;
            owner.ensure_open()?;
            Ok(owner)
        }
        Lifetime::Scoped if scope.id == binding.owner => {
            Err(DiError::ScopedFromOwner { key: key.clone() })
        }
        Lifetime::Scoped | Lifetime::Transient => Ok(Arc::clone(scope)),
    }
}

fn resolve_inputs(
    scope: &Arc<ScopeInner>,
    ctx: &Context,
    key: &TypeKey,
    binding: &Binding,
    cached: bool,
    stack: &mut Vec<TypeKey>,
) -> Result<Inputs> {
    let descriptor = &binding.descriptor;
    let ready = Arc::new(AtomicBool::new(false));

    // An alias of an already constructed instance only needs its own decorators.
    let dependencies = if cached && scope.is_memoized(&CacheKey::Instance(descriptor.id)) {
        Vec::new()
    } else {
        resolve_all(scope, ctx, key, &descriptor.dependencies, stack, &ready)?
    };

    // Slice items are decorated like the key they were registered under.
    let mut stages = Vec::new();
    for decorator in scope.registry.decorators(&binding.registered) {
        let ready = Arc::new(AtomicBool::new(false));
        let values = resolve_all(scope, ctx, key, &decorator.dependencies, stack, &ready)?;
        stages.push(Stage {
            decorator: Arc::clone(decorator),
            values,
            ready,
        });
    }

    Ok(Inputs {
        dependencies,
        ready,
        stages,
    })
}

/// Resolve `dependencies` in order, stopping at the first failure.
fn resolve_all(
    scope: &Arc<ScopeInner>,
    ctx: &Context,
    service: &TypeKey,
    dependencies: &[TypeKey],
    stack: &mut Vec<TypeKey>,
    ready: &Arc<AtomicBool>,
) -> Result<Vec<AnyService>> {
    dependencies
        .iter()
        .map(|dependency| {
            resolve_parameter(scope, ctx, dependency, stack, ready)
                .map_err(|err| DiError::dependency(service.clone(), dependency.clone(), err))
        })
        .collect()
}

fn construct(
    scope: &Arc<ScopeInner>,
    ctx: &Context,
    descriptor: &ServiceDescriptor,
    dependencies: &[AnyService],
    ready: &AtomicBool,
    close_raw: bool,
) -> Result<AnyService> {
    ctx.check()?;

    #[cfg(feature = "logging")]
    trace!(
        target: "scoped_injector",
        service = %descriptor.produced,
        lifetime = descriptor.lifetime.as_str(),
        scope_id = scope.id.id(),
        "Constructing service"
    );

    let instance = descriptor.produce(dependencies);
    ready.store(true, Ordering::Release);
    let instance = instance?;

    // Cancellation observed while constructing is cached with the instance.
    ctx.check()?;

    if close_raw {
        attach_closer(scope, ctx, descriptor, &instance)?;
    }
    Ok(instance)
}

/// Hand the closer for `subject` to the scope, or run it now if the scope is
/// already closing.
fn attach_closer(
    scope: &ScopeInner,
    ctx: &Context,
    descriptor: &ServiceDescriptor,
    subject: &AnyService,
) -> Result<()> {
    let closer = descriptor
        .closer
        .as_ref()
        .and_then(|factory| factory.bind(subject));
    if let Some(closer) = closer {
        if let Err(closer) = scope.push_closer(descriptor.produced.clone(), closer) {
            // The scope started closing while we were constructing.
            let _result = closer(ctx);

            #[cfg(feature = "logging")]
            if let Err(err) = _result {
                warn!(
                    target: "scoped_injector",
                    service = %descriptor.produced,
                    error = %err,
                    "Closer failed"
                );
            }

            return Err(DiError::Closed);
        }
    }
    Ok(())
}

fn decorate(
    key: &TypeKey,
    binding: &Binding,
    instance: AnyService,
    stages: Vec<Stage>,
) -> Result<AnyService> {
    let mut value = binding.project(key, instance)?;
    for stage in stages {
        let decorated = (stage.decorator.transform)(value, &stage.values);
        stage.ready.store(true, Ordering::Release);
        value = decorated?;
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use crate::registration::{Decorator, Service};
    use crate::ErrorKind;
    use std::sync::atomic::AtomicU32;

    struct A;
    struct B;
    struct Leaf;

    struct Counter(u32);

    #[test]
    fn test_sibling_branches_are_not_cycles() {
        struct Top;
        let container = Container::new([
            Service::factory(|| Leaf).into(),
            Service::factory(|_l: Arc<Leaf>| A).into(),
            Service::factory(|_l: Arc<Leaf>| B).into(),
            Service::factory(|_a: Arc<A>, _b: Arc<B>| Top).transient().into(),
        ])
        .unwrap();

        assert!(container.resolve::<Top>(&Context::background()).is_ok());
    }

    #[test]
    fn test_self_cycle() {
        let container =
            Container::new([Service::factory(|_a: Arc<A>| A).transient().into()]).unwrap();

        let err = container.resolve::<A>(&Context::background()).err().unwrap();
        match err.root_cause() {
            DiError::Cycle { chain } => assert_eq!(chain.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_failure_is_cached() {
        static CALLS: AtomicU32 = AtomicU32::new(0);
        let container = Container::new([Service::try_factory(|| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Err::<Leaf, _>("unavailable")
        })
        .into()])
        .unwrap();
        let ctx = Context::background();

        for _ in 0..3 {
            let err = container.resolve::<Leaf>(&ctx).err().unwrap();
            assert_eq!(err.kind(), ErrorKind::ConstructorError);
            assert_eq!(err.to_string(), "unavailable");
        }
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_dependency_names_chain() {
        let container = Container::new([Service::factory(|_b: Arc<B>| A).into()]).unwrap();

        let err = container.resolve::<A>(&Context::background()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ServiceNotRegistered);
        assert_eq!(err.chain(), vec![&TypeKey::of::<A>(), &TypeKey::of::<B>()]);
        assert!(err.to_string().starts_with("resolving "));
    }

    #[test]
    fn test_decorators_apply_in_order() {
        let container = Container::new([
            Service::factory(|| Counter(1)).into(),
            Decorator::new(|c: Arc<Counter>| Arc::new(Counter(c.0 * 10))).into(),
            Decorator::new(|c: Arc<Counter>| Arc::new(Counter(c.0 + 2))).into(),
        ])
        .unwrap();
        let ctx = Context::background();

        let first = container.resolve::<Counter>(&ctx).unwrap();
        let second = container.resolve::<Counter>(&ctx).unwrap();
        assert_eq!(first.0, 12);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_values_are_not_decorated() {
        let container = Container::new([
            Service::value(Counter(1)).into(),
            Decorator::new(|c: Arc<Counter>| Arc::new(Counter(c.0 + 1))).into(),
        ])
        .unwrap();

        assert_eq!(container.resolve::<Counter>(&Context::background()).unwrap().0, 1);
    }

    #[test]
    fn test_decorator_dependency_failure() {
        let container = Container::new([
            Service::factory(|| Counter(1)).into(),
            Decorator::new(|c: Arc<Counter>, _b: Arc<B>| c).into(),
        ])
        .unwrap();

        let err = container.resolve::<Counter>(&Context::background()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ServiceNotRegistered);
    }

    #[test]
    fn test_slice_items_are_decorated() {
        let container = Container::new([
            Service::factory(|| Counter(1)).into(),
            Service::factory(|| Counter(2)).into(),
            Decorator::new(|c: Arc<Counter>| Arc::new(Counter(c.0 * 10))).into(),
        ])
        .unwrap();
        let ctx = Context::background();

        let all: Vec<_> = container
            .resolve_all::<Counter>(&ctx)
            .unwrap()
            .iter()
            .map(|c| c.0)
            .collect();
        assert_eq!(all, vec![10, 20]);
        assert_eq!(container.resolve::<Counter>(&ctx).unwrap().0, 20);
    }

    #[test]
    fn test_slice_item_is_the_decorated_singleton() {
        static DECORATED: AtomicU32 = AtomicU32::new(0);
        let container = Container::new([
            Service::factory(|| Counter(1)).into(),
            Decorator::new(|c: Arc<Counter>| {
                DECORATED.fetch_add(1, Ordering::SeqCst);
                Arc::new(Counter(c.0 + 1))
            })
            .into(),
        ])
        .unwrap();
        let ctx = Context::background();

        let single = container.resolve::<Counter>(&ctx).unwrap();
        let all = container.resolve_all::<Counter>(&ctx).unwrap();
        assert_eq!(single.0, 2);
        assert!(Arc::ptr_eq(&single, &all[0]));
        assert_eq!(DECORATED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tagged_slice_item_uses_tagged_decorators() {
        let container = Container::new([
            Service::factory(|| Counter(1)).tag("primary").into(),
            Service::factory(|| Counter(2)).into(),
            Decorator::new(|c: Arc<Counter>| Arc::new(Counter(c.0 * 10))).into(),
            Decorator::new(|c: Arc<Counter>| Arc::new(Counter(c.0 + 5)))
                .tag("primary")
                .into(),
        ])
        .unwrap();
        let ctx = Context::background();

        let tagged = container.resolve_tagged::<Counter>(&ctx, "primary").unwrap();
        let all = container.resolve_all::<Counter>(&ctx).unwrap();
        assert_eq!(tagged.0, 6);
        assert_eq!(all.iter().map(|c| c.0).collect::<Vec<_>>(), vec![6, 20]);
        assert!(Arc::ptr_eq(&tagged, &all[0]));
    }

    #[test]
    fn test_closer_receives_decorated_value() {
        struct Resource(&'static str);
        let closed = Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = Arc::clone(&closed);
        let container = Container::new([
            Service::factory(|| Resource("raw"))
                .close_with(move |r: &Resource| log.lock().unwrap().push(r.0))
                .into(),
            Decorator::new(|_r: Arc<Resource>| Arc::new(Resource("decorated"))).into(),
        ])
        .unwrap();
        let ctx = Context::background();

        assert_eq!(container.resolve::<Resource>(&ctx).unwrap().0, "decorated");
        assert!(container.resolve_all::<Resource>(&ctx).is_ok());
        container.close(&ctx).unwrap();
        assert_eq!(*closed.lock().unwrap(), vec!["decorated"]);
    }

    #[test]
    fn test_aliased_instance_closed_once() {
        trait Reader: Send + Sync {}
        trait Writer: Send + Sync {}
        struct File;
        impl Reader for File {}
        impl Writer for File {}

        static CLOSED: AtomicU32 = AtomicU32::new(0);
        let container = Container::new([Service::factory(|| File)
            .alias::<dyn Reader>(|f| f)
            .alias::<dyn Writer>(|f| f)
            .close_with(|_: &File| {
                CLOSED.fetch_add(1, Ordering::SeqCst);
            })
            .into()])
        .unwrap();
        let ctx = Context::background();

        container.resolve::<dyn Reader>(&ctx).unwrap();
        container.resolve::<dyn Writer>(&ctx).unwrap();
        container.close(&ctx).unwrap();
        assert_eq!(CLOSED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_singleton_dependencies_resolve_in_owner_scope() {
        let root = Container::new([
            Service::factory(|| Leaf).scoped().into(),
            Service::factory(|_l: Arc<Leaf>| A).into(),
        ])
        .unwrap();
        let child = root.new_scope([]).unwrap();

        // A singleton may not capture a scoped instance of some child.
        let err = child.resolve::<A>(&Context::background()).err().unwrap();
        assert!(matches!(err.root_cause(), DiError::ScopedFromOwner { .. }));
        assert!(child.resolve::<Leaf>(&Context::background()).is_ok());
    }

    #[test]
    fn test_cancellation_before_construction_is_not_cached() {
        static CALLS: AtomicU32 = AtomicU32::new(0);
        let container = Container::new([Service::factory(|| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Leaf
        })
        .into()])
        .unwrap();

        let (canceled, cancel) = Context::background().with_cancel();
        cancel.cancel();
        let err = container.resolve::<Leaf>(&canceled).err().unwrap();
        assert_eq!(err.context_error(), Some(crate::ContextError::Canceled));
        assert_eq!(CALLS.load(Ordering::SeqCst), 0);

        assert!(container.resolve::<Leaf>(&Context::background()).is_ok());
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancellation_during_construction_is_cached() {
        static CALLS: AtomicU32 = AtomicU32::new(0);

        let (canceled, cancel) = Context::background().with_cancel();
        let container = Container::new([Service::factory(move |_ctx: Context| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            // The caller gives up while the instance is being built.
            cancel.cancel();
            Leaf
        })
        .into()])
        .unwrap();

        let err = container.resolve::<Leaf>(&canceled).err().unwrap();
        assert_eq!(err.context_error(), Some(crate::ContextError::Canceled));

        // The failure belongs to the singleton now, whatever the caller's context.
        let err = container.resolve::<Leaf>(&Context::background()).err().unwrap();
        assert_eq!(err.context_error(), Some(crate::ContextError::Canceled));
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }
}
