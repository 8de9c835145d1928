//! Constructor and decorator adapters
//!
//! Plain closures become constructors by implementing [`Constructor`] (returns
//! the service) or [`TryConstructor`] (returns `Result<service, E>`). Every
//! parameter must implement [`Inject`]; the parameter types, in order, are the
//! declared dependencies.
//!
//! Decorators work the same way, with the decorated service as the first
//! parameter ([`DecoratorFn`], [`TryDecoratorFn`]).
//!
//! All adapters are generated for 0 to 10 parameters.

use crate::error::{BoxError, DiError};
use crate::key::TypeKey;
use crate::provider::{AnyService, Inject, Injectable};
use std::sync::Arc;

/// A function producing `T` from injected parameters.
pub trait Constructor<T, Args>: Send + Sync + 'static {
    /// Keys of the parameters, in positional order.
    fn dependencies() -> Vec<TypeKey>;

    /// Call the function with resolved parameter values.
    fn construct(&self, args: &[AnyService]) -> Result<T, DiError>;
}

/// A function producing `Result<T, E>` from injected parameters.
///
/// The error is passed through as [`DiError::Constructor`].
pub trait TryConstructor<T, E, Args>: Send + Sync + 'static {
    fn dependencies() -> Vec<TypeKey>;

    fn construct(&self, args: &[AnyService]) -> Result<T, DiError>;
}

/// A function transforming an `Arc<S>` before it is cached or returned.
pub trait DecoratorFn<S: ?Sized, Args>: Send + Sync + 'static {
    /// Keys of the parameters after the decorated service.
    fn dependencies() -> Vec<TypeKey>;

    fn decorate(&self, target: Arc<S>, args: &[AnyService]) -> Result<Arc<S>, DiError>;
}

/// Fallible form of [`DecoratorFn`].
pub trait TryDecoratorFn<S: ?Sized, E, Args>: Send + Sync + 'static {
    fn dependencies() -> Vec<TypeKey>;

    fn decorate(&self, target: Arc<S>, args: &[AnyService]) -> Result<Arc<S>, DiError>;
}

/// Take the `index`-th resolved value as an `A`.
#[inline]
pub(crate) fn arg<A: Inject>(args: &[AnyService], index: usize) -> Result<A, DiError> {
    args.get(index)
        .and_then(A::extract)
        .ok_or_else(|| DiError::TypeMismatch { key: A::key() })
}

// =============================================================================
// Arity implementations
// =============================================================================

macro_rules! impl_adapters {
    ($($arg:ident => $idx:tt),*) => {
        impl<F, T, $($arg,)*> Constructor<T, ($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> T + Send + Sync + 'static,
            T: Injectable,
            $($arg: Inject,)*
        {
            #[inline]
            fn dependencies() -> Vec<TypeKey> {
                vec![$(<$arg as Inject>::key()),*]
            }

            #[allow(unused_variables)]
            #[inline]
            fn construct(&self, args: &[AnyService]) -> Result<T, DiError> {
                Ok(self($(arg::<$arg>(args, $idx)?),*))
            }
        }

        impl<F, T, E, $($arg,)*> TryConstructor<T, E, ($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> Result<T, E> + Send + Sync + 'static,
            T: Injectable,
            E: Into<BoxError>,
            $($arg: Inject,)*
        {
            #[inline]
            fn dependencies() -> Vec<TypeKey> {
                vec![$(<$arg as Inject>::key()),*]
            }

            #[allow(unused_variables)]
            #[inline]
            fn construct(&self, args: &[AnyService]) -> Result<T, DiError> {
                self($(arg::<$arg>(args, $idx)?),*)
                    .map_err(|err| DiError::constructor(TypeKey::of::<T>(), err))
            }
        }

        impl<F, S, $($arg,)*> DecoratorFn<S, ($($arg,)*)> for F
        where
            F: Fn(Arc<S>, $($arg),*) -> Arc<S> + Send + Sync + 'static,
            S: ?Sized + Injectable,
            $($arg: Inject,)*
        {
            #[inline]
            fn dependencies() -> Vec<TypeKey> {
                vec![$(<$arg as Inject>::key()),*]
            }

            #[allow(unused_variables)]
            #[inline]
            fn decorate(&self, target: Arc<S>, args: &[AnyService]) -> Result<Arc<S>, DiError> {
                Ok(self(target, $(arg::<$arg>(args, $idx)?),*))
            }
        }

        impl<F, S, E, $($arg,)*> TryDecoratorFn<S, E, ($($arg,)*)> for F
        where
            F: Fn(Arc<S>, $($arg),*) -> Result<Arc<S>, E> + Send + Sync + 'static,
            S: ?Sized + Injectable,
            E: Into<BoxError>,
            $($arg: Inject,)*
        {
            #[inline]
            fn dependencies() -> Vec<TypeKey> {
                vec![$(<$arg as Inject>::key()),*]
            }

            #[allow(unused_variables)]
            #[inline]
            fn decorate(&self, target: Arc<S>, args: &[AnyService]) -> Result<Arc<S>, DiError> {
                self(target, $(arg::<$arg>(args, $idx)?),*)
                    .map_err(|err| DiError::constructor(TypeKey::of::<S>(), err))
            }
        }
    };
}

impl_adapters!();
impl_adapters!(A1 => 0);
impl_adapters!(A1 => 0, A2 => 1);
impl_adapters!(A1 => 0, A2 => 1, A3 => 2);
impl_adapters!(A1 => 0, A2 => 1, A3 => 2, A4 => 3);
impl_adapters!(A1 => 0, A2 => 1, A3 => 2, A4 => 3, A5 => 4);
impl_adapters!(A1 => 0, A2 => 1, A3 => 2, A4 => 3, A5 => 4, A6 => 5);
impl_adapters!(A1 => 0, A2 => 1, A3 => 2, A4 => 3, A5 => 4, A6 => 5, A7 => 6);
impl_adapters!(A1 => 0, A2 => 1, A3 => 2, A4 => 3, A5 => 4, A6 => 5, A7 => 6, A8 => 7);
impl_adapters!(A1 => 0, A2 => 1, A3 => 2, A4 => 3, A5 => 4, A6 => 5, A7 => 6, A8 => 7, A9 => 8);
impl_adapters!(A1 => 0, A2 => 1, A3 => 2, A4 => 3, A5 => 4, A6 => 5, A7 => 6, A8 => 7, A9 => 8, A10 => 9);
