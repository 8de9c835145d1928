//! Service descriptors: the registered recipe for producing a service
//!
//! A descriptor is built once from a registration and never changes. Child
//! scopes share their parent's descriptors by `Arc`.

use crate::closer::CloserFactory;
use crate::error::DiError;
use crate::key::TypeKey;
use crate::provider::{erase, unerase, AnyService, Injectable, Lifetime};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Type-erased constructor over positional dependency values.
pub(crate) type ConstructFn = Arc<dyn Fn(&[AnyService]) -> Result<AnyService, DiError> + Send + Sync>;

/// Assembles resolved slice items into the aggregate value.
pub(crate) type AssembleFn = Arc<dyn Fn(&[AnyService]) -> AnyService + Send + Sync>;

/// Decorator body: the previous stage's value plus the decorator's own dependencies.
pub(crate) type TransformFn =
    Arc<dyn Fn(AnyService, &[AnyService]) -> Result<AnyService, DiError> + Send + Sync>;

/// Converts a produced value into an alias view of it.
pub(crate) type ProjectFn = Arc<dyn Fn(&AnyService) -> Option<AnyService> + Send + Sync>;

/// How a descriptor produces its value.
pub(crate) enum DescriptorKind {
    /// A fixed value supplied at registration.
    Value(AnyService),
    /// A constructor invoked with the resolved dependencies.
    Function(ConstructFn),
    /// The ordered aggregate of every registration of one type.
    Slice(AssembleFn),
}

impl DescriptorKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::Function(_) => "function",
            Self::Slice(_) => "slice",
        }
    }
}

pub(crate) struct ServiceDescriptor {
    /// Unique per descriptor; instance cache entries are keyed by it.
    pub(crate) id: u64,
    pub(crate) produced: TypeKey,
    pub(crate) lifetime: Lifetime,
    pub(crate) dependencies: Vec<TypeKey>,
    pub(crate) kind: DescriptorKind,
    pub(crate) closer: Option<CloserFactory>,
}

impl ServiceDescriptor {
    pub(crate) fn new(
        produced: TypeKey,
        lifetime: Lifetime,
        dependencies: Vec<TypeKey>,
        kind: DescriptorKind,
        closer: Option<CloserFactory>,
    ) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            produced,
            lifetime,
            dependencies,
            kind,
            closer,
        }
    }

    /// Slice descriptor over `items`, which are resolved as ordinary dependencies.
    pub(crate) fn slice(slice_key: TypeKey, items: Vec<TypeKey>, assemble: AssembleFn) -> Self {
        Self::new(
            slice_key,
            Lifetime::Transient,
            items,
            DescriptorKind::Slice(assemble),
            None,
        )
    }

    #[inline]
    pub(crate) fn is_slice(&self) -> bool {
        matches!(self.kind, DescriptorKind::Slice(_))
    }

    /// Produce a new instance from already-resolved dependency values.
    pub(crate) fn produce(&self, dependencies: &[AnyService]) -> Result<AnyService, DiError> {
        match &self.kind {
            DescriptorKind::Value(value) => Ok(Arc::clone(value)),
            DescriptorKind::Function(construct) => construct(dependencies),
            DescriptorKind::Slice(assemble) => Ok(assemble(dependencies)),
        }
    }
}

impl std::fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("id", &self.id)
            .field("produced", &self.produced)
            .field("lifetime", &self.lifetime)
            .field("kind", &self.kind.as_str())
            .field("dependencies", &self.dependencies)
            .field("closeable", &self.closer.is_some())
            .finish()
    }
}

/// A transform layered onto resolution of `target`.
pub(crate) struct DecoratorDescriptor {
    pub(crate) target: TypeKey,
    /// Dependencies other than the decorated value itself.
    pub(crate) dependencies: Vec<TypeKey>,
    pub(crate) transform: TransformFn,
}

impl std::fmt::Debug for DecoratorDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoratorDescriptor")
            .field("target", &self.target)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// The aggregate view a type's registrations are threaded into.
#[derive(Clone)]
pub(crate) struct SliceView {
    pub(crate) item: TypeKey,
    pub(crate) slice: TypeKey,
    pub(crate) assemble: AssembleFn,
}

impl SliceView {
    /// View of every `S` as `Vec<Arc<S>>`.
    pub(crate) fn of<S: ?Sized + Injectable>() -> Self {
        Self {
            item: TypeKey::of::<S>(),
            slice: TypeKey::of::<Vec<Arc<S>>>(),
            assemble: Arc::new(|items: &[AnyService]| {
                let all: Vec<Arc<S>> = items.iter().filter_map(unerase::<S>).collect();
                erase(Arc::new(all))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Plugin: Send + Sync {
        fn name(&self) -> &'static str;
    }

    struct Alpha;
    struct Beta;

    impl Plugin for Alpha {
        fn name(&self) -> &'static str {
            "alpha"
        }
    }

    impl Plugin for Beta {
        fn name(&self) -> &'static str {
            "beta"
        }
    }

    #[test]
    fn test_descriptor_ids_unique() {
        let a = ServiceDescriptor::new(
            TypeKey::of::<Alpha>(),
            Lifetime::Singleton,
            Vec::new(),
            DescriptorKind::Value(erase(Arc::new(Alpha))),
            None,
        );
        let b = ServiceDescriptor::new(
            TypeKey::of::<Alpha>(),
            Lifetime::Singleton,
            Vec::new(),
            DescriptorKind::Value(erase(Arc::new(Alpha))),
            None,
        );
        assert_ne!(a.id, b.id);
        assert!(!a.is_slice());
    }

    #[test]
    fn test_slice_assembles_in_order() {
        let view = SliceView::of::<dyn Plugin>();
        let alpha: Arc<dyn Plugin> = Arc::new(Alpha);
        let beta: Arc<dyn Plugin> = Arc::new(Beta);

        let descriptor = ServiceDescriptor::slice(
            view.slice.clone(),
            vec![view.item.clone(), view.item.clone()],
            view.assemble,
        );
        assert!(descriptor.is_slice());
        assert_eq!(descriptor.lifetime, Lifetime::Transient);

        let value = descriptor.produce(&[erase(alpha), erase(beta)]).unwrap();
        let all = unerase::<Vec<Arc<dyn Plugin>>>(&value).unwrap();
        let names: Vec<_> = all.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }
}
