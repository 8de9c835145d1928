//! Registry storage
//!
//! A [`Registry`] maps [`TypeKey`]s to bindings and is frozen once its scope is
//! built. Child scopes start out sharing their parent's registry and only copy
//! it when they add a registration of their own ([`RegistryCow`]).

use crate::descriptor::{DecoratorDescriptor, ProjectFn, ServiceDescriptor, SliceView};
use crate::error::{DiError, ValidationError};
use crate::key::{Tag, TypeKey};
use crate::provider::AnyService;
use crate::scope::ScopeId;
use ahash::RandomState;
use std::collections::HashMap;
use std::sync::Arc;

/// What the registry stores under one key.
#[derive(Clone)]
pub(crate) struct Binding {
    pub(crate) descriptor: Arc<ServiceDescriptor>,
    /// Key the registration was bound under; its slice item shares it.
    pub(crate) registered: TypeKey,
    /// Scope that registered the descriptor.
    pub(crate) owner: ScopeId,
    /// Alias conversion from the produced type to the bound key's type.
    pub(crate) projection: Option<ProjectFn>,
}

impl Binding {
    /// View `instance` as the bound key's type.
    pub(crate) fn project(&self, key: &TypeKey, instance: AnyService) -> Result<AnyService, DiError> {
        match &self.projection {
            None => Ok(instance),
            Some(project) => {
                project(&instance).ok_or_else(|| DiError::TypeMismatch { key: key.clone() })
            }
        }
    }
}

/// Registration map for one scope, including everything inherited.
#[derive(Clone, Default)]
pub(crate) struct Registry {
    bindings: HashMap<TypeKey, Binding, RandomState>,
    decorators: HashMap<TypeKey, Vec<Arc<DecoratorDescriptor>>, RandomState>,
}

impl Registry {
    #[inline]
    pub(crate) fn get(&self, key: &TypeKey) -> Option<&Binding> {
        self.bindings.get(key)
    }

    #[inline]
    pub(crate) fn contains(&self, key: &TypeKey) -> bool {
        self.bindings.contains_key(key)
    }

    /// Decorators for `key`, in registration order.
    #[inline]
    pub(crate) fn decorators(&self, key: &TypeKey) -> &[Arc<DecoratorDescriptor>] {
        self.decorators.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Keys a caller can address, excluding positional slice items.
    pub(crate) fn keys(&self) -> impl Iterator<Item = &TypeKey> {
        self.bindings
            .keys()
            .filter(|key| !key.tag().is_some_and(Tag::is_slice_item))
    }

    /// Bind `binding` under `key` and thread it into the aggregate view.
    ///
    /// A later binding for the same key replaces the earlier one; the aggregate
    /// keeps both.
    pub(crate) fn bind(
        &mut self,
        key: TypeKey,
        view: &SliceView,
        binding: Binding,
    ) -> Result<(), ValidationError> {
        if self.get(&key).is_some_and(|existing| existing.descriptor.is_slice()) {
            return Err(reserved(&key));
        }
        let mut items = match self.get(&view.slice) {
            Some(existing) if existing.descriptor.is_slice() => {
                existing.descriptor.dependencies.clone()
            }
            Some(_) => return Err(reserved(&view.slice)),
            None => Vec::new(),
        };

        let item = view.item.clone().with_tag(Tag::slice_item(items.len()));
        items.push(item.clone());

        let owner = binding.owner;
        self.bindings.insert(item, binding.clone());
        self.bindings.insert(key, binding);
        self.bindings.insert(
            view.slice.clone(),
            Binding {
                descriptor: Arc::new(ServiceDescriptor::slice(
                    view.slice.clone(),
                    items,
                    Arc::clone(&view.assemble),
                )),
                registered: view.slice.clone(),
                owner,
                projection: None,
            },
        );
        Ok(())
    }

    pub(crate) fn decorate(&mut self, decorator: Arc<DecoratorDescriptor>) {
        self.decorators
            .entry(decorator.target.clone())
            .or_default()
            .push(decorator);
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.keys().count()
    }
}

fn reserved(key: &TypeKey) -> ValidationError {
    ValidationError::UnsupportedKind {
        type_name: key.type_name(),
        reason: "the key is reserved for the aggregate of its item type",
    }
}

/// A scope's registry while the scope is being built.
///
/// `Borrowed` shares the parent's frozen registry; the first local registration
/// clones it into `Owned` so the parent is never touched.
pub(crate) enum RegistryCow {
    Borrowed(Arc<Registry>),
    Owned(Registry),
}

impl RegistryCow {
    #[inline]
    pub(crate) fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }

    pub(crate) fn to_mut(&mut self) -> &mut Registry {
        if let Self::Borrowed(shared) = self {
            *self = Self::Owned(Registry::clone(shared));
        }
        match self {
            Self::Owned(registry) => registry,
            Self::Borrowed(_) => unreachable!("registry was just made owned"),
        }
    }

    /// Freeze into the shared form; also reports whether the registry is owned.
    pub(crate) fn freeze(self) -> (Arc<Registry>, bool) {
        match self {
            Self::Borrowed(shared) => (shared, false),
            Self::Owned(registry) => (Arc::new(registry), true),
        }
    }
}
