//! Provider traits for dependency injection
//!
//! These traits define what types can be provided and injected, and how long
//! provided instances live.

use crate::context::Context;
use crate::key::TypeKey;
use crate::scope::ScopeHandle;
use std::any::Any;
use std::sync::Arc;

/// Type-erased service value.
///
/// A service of type `S` travels as an `Arc<dyn Any>` holding an `Arc<S>`, so
/// trait objects and concrete types share one representation.
pub type AnyService = Arc<dyn Any + Send + Sync>;

/// Marker trait for types that can be provided by the container.
///
/// This is automatically implemented for all types that are `Send + Sync + 'static`,
/// including trait objects such as `dyn Repository + Send + Sync`.
pub trait Injectable: Send + Sync + 'static {}

impl<T: ?Sized + Send + Sync + 'static> Injectable for T {}

/// Erase an `Arc<S>` into the container's service representation.
#[inline]
pub(crate) fn erase<S: ?Sized + Injectable>(service: Arc<S>) -> AnyService {
    Arc::new(service)
}

/// Recover the `Arc<S>` stored by [`erase`].
#[inline]
pub(crate) fn unerase<S: ?Sized + Injectable>(service: &AnyService) -> Option<Arc<S>> {
    service.downcast_ref::<Arc<S>>().cloned()
}

/// Service lifetime specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Lifetime {
    /// One instance per registering scope, shared with every descendant
    #[default]
    Singleton,

    /// One instance per descendant scope of the registering scope
    Scoped,

    /// New instance created on every resolve
    Transient,
}

impl Lifetime {
    /// Whether instances are memoized in a scope cache.
    #[inline]
    pub fn is_cached(self) -> bool {
        !matches!(self, Lifetime::Transient)
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Lifetime::Singleton => "singleton",
            Lifetime::Scoped => "scoped",
            Lifetime::Transient => "transient",
        }
    }
}

/// Process-wide marker identities for the two always-injectable parameters.
///
/// They are private types so no registration can ever occupy these keys.
pub(crate) mod markers {
    use crate::key::TypeKey;

    pub(crate) struct AmbientContext;
    pub(crate) struct SelfScope;

    pub(crate) fn context() -> TypeKey {
        TypeKey::of::<AmbientContext>()
    }

    pub(crate) fn scope() -> TypeKey {
        TypeKey::of::<SelfScope>()
    }
}

/// A value the engine can pass as a constructor, decorator or `invoke` parameter.
///
/// Implemented for `Arc<S>` (a registered service), [`Context`] (the caller's
/// context) and [`ScopeHandle`] (the resolving scope).
pub trait Inject: Sized + Send + 'static {
    /// The key resolved for this parameter.
    fn key() -> TypeKey;

    /// Take the parameter out of a resolved value.
    #[doc(hidden)]
    fn extract(value: &AnyService) -> Option<Self>;
}

impl<S: ?Sized + Injectable> Inject for Arc<S> {
    #[inline]
    fn key() -> TypeKey {
        TypeKey::of::<S>()
    }

    #[inline]
    fn extract(value: &AnyService) -> Option<Self> {
        unerase::<S>(value)
    }
}

impl Inject for Context {
    #[inline]
    fn key() -> TypeKey {
        markers::context()
    }

    #[inline]
    fn extract(value: &AnyService) -> Option<Self> {
        value.downcast_ref::<Context>().cloned()
    }
}

impl Inject for ScopeHandle {
    #[inline]
    fn key() -> TypeKey {
        markers::scope()
    }

    #[inline]
    fn extract(value: &AnyService) -> Option<Self> {
        value.downcast_ref::<ScopeHandle>().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> &'static str;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> &'static str {
            "hello"
        }
    }

    #[test]
    fn test_erase_roundtrip_keeps_identity() {
        let original = Arc::new(English);
        let erased = erase(Arc::clone(&original));
        let back = unerase::<English>(&erased).unwrap();
        assert!(Arc::ptr_eq(&original, &back));
    }

    #[test]
    fn test_erase_trait_object() {
        let greeter: Arc<dyn Greeter> = Arc::new(English);
        let erased = erase(greeter);
        let back = <Arc<dyn Greeter> as Inject>::extract(&erased).unwrap();
        assert_eq!(back.greet(), "hello");
        assert!(unerase::<English>(&erased).is_none());
    }

    #[test]
    fn test_marker_keys_are_private() {
        assert_ne!(<Context as Inject>::key(), TypeKey::of::<Context>());
        assert_ne!(<ScopeHandle as Inject>::key(), TypeKey::of::<ScopeHandle>());
        assert_ne!(<Context as Inject>::key(), <ScopeHandle as Inject>::key());
    }

    #[test]
    fn test_lifetime_caching() {
        assert!(Lifetime::Singleton.is_cached());
        assert!(Lifetime::Scoped.is_cached());
        assert!(!Lifetime::Transient.is_cached());
        assert_eq!(Lifetime::default(), Lifetime::Singleton);
    }
}
