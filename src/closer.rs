//! Closers: uniform teardown for produced services
//!
//! A closer is bound once, at registration time, from one of four function
//! shapes or from a [`Close`] implementation. When the service is produced the
//! bound closer captures the instance and is appended to the resolving scope's
//! [`CloserRegistry`]; closing the scope runs them newest first.

use crate::context::Context;
use crate::error::{BoxError, SharedError};
use crate::key::TypeKey;
use crate::provider::{unerase, AnyService, Injectable};
use std::sync::{Arc, Mutex, PoisonError};

#[cfg(feature = "logging")]
use tracing::{trace, warn};

/// Uniform close capability.
///
/// ```rust
/// use scoped_injector::{BoxError, Close, Context};
///
/// struct Pool;
///
/// impl Close for Pool {
///     fn close(&self, _ctx: &Context) -> Result<(), BoxError> {
///         Ok(())
///     }
/// }
/// ```
pub trait Close: Send + Sync {
    fn close(&self, ctx: &Context) -> Result<(), BoxError>;
}

/// Captured teardown for one produced instance.
pub(crate) type Closer = Box<dyn FnOnce(&Context) -> Result<(), BoxError> + Send>;

/// Builds a [`Closer`] for a freshly produced instance.
#[derive(Clone)]
pub(crate) struct CloserFactory(Arc<dyn Fn(&AnyService) -> Option<Closer> + Send + Sync>);

impl CloserFactory {
    /// Closer bound to `T`'s [`Close`] implementation.
    pub(crate) fn from_close<T: ?Sized + Close + Injectable>() -> Self {
        Self::from_fn::<T, _, shape::WithContext<BoxError>>(|service: &T, ctx: &Context| {
            service.close(ctx)
        })
    }

    /// Closer bound to a function of any supported shape.
    pub(crate) fn from_fn<T, F, Shape>(close: F) -> Self
    where
        T: ?Sized + Injectable,
        F: CloseFn<T, Shape>,
        Shape: 'static,
    {
        let close = Arc::new(close);
        Self(Arc::new(move |service: &AnyService| {
            let instance = unerase::<T>(service)?;
            let close = Arc::clone(&close);
            Some(Box::new(move |ctx: &Context| close.call(&instance, ctx)) as Closer)
        }))
    }

    #[inline]
    pub(crate) fn bind(&self, service: &AnyService) -> Option<Closer> {
        (self.0)(service)
    }
}

/// Shape markers for [`CloseFn`]; they only disambiguate the implementations.
pub mod shape {
    use std::marker::PhantomData;

    /// `Fn(&T, &Context) -> Result<(), E>`
    pub struct WithContext<E>(PhantomData<E>);
    /// `Fn(&T, &Context)`
    pub struct ContextOnly;
    /// `Fn(&T) -> Result<(), E>`
    pub struct ErrorOnly<E>(PhantomData<E>);
    /// `Fn(&T)`
    pub struct NoArgs;
}

/// A function usable as a closer for `T`.
///
/// Implemented for closures of the four supported shapes; the `Shape` parameter
/// is inferred.
pub trait CloseFn<T: ?Sized, Shape>: Send + Sync + 'static {
    fn call(&self, service: &T, ctx: &Context) -> Result<(), BoxError>;
}

impl<T, F, E> CloseFn<T, shape::WithContext<E>> for F
where
    T: ?Sized,
    F: Fn(&T, &Context) -> Result<(), E> + Send + Sync + 'static,
    E: Into<BoxError>,
{
    fn call(&self, service: &T, ctx: &Context) -> Result<(), BoxError> {
        self(service, ctx).map_err(Into::into)
    }
}

impl<T, F> CloseFn<T, shape::ContextOnly> for F
where
    T: ?Sized,
    F: Fn(&T, &Context) + Send + Sync + 'static,
{
    fn call(&self, service: &T, ctx: &Context) -> Result<(), BoxError> {
        self(service, ctx);
        Ok(())
    }
}

impl<T, F, E> CloseFn<T, shape::ErrorOnly<E>> for F
where
    T: ?Sized,
    F: Fn(&T) -> Result<(), E> + Send + Sync + 'static,
    E: Into<BoxError>,
{
    fn call(&self, service: &T, _ctx: &Context) -> Result<(), BoxError> {
        self(service).map_err(Into::into)
    }
}

impl<T, F> CloseFn<T, shape::NoArgs> for F
where
    T: ?Sized,
    F: Fn(&T) + Send + Sync + 'static,
{
    fn call(&self, service: &T, _ctx: &Context) -> Result<(), BoxError> {
        self(service);
        Ok(())
    }
}

/// Append-only list of closers owned by one scope.
#[derive(Default)]
pub(crate) struct CloserRegistry {
    closers: Mutex<Vec<(TypeKey, Closer)>>,
}

impl CloserRegistry {
    pub(crate) fn push(&self, key: TypeKey, closer: Closer) {
        #[cfg(feature = "logging")]
        trace!(
            target: "scoped_injector",
            service = %key,
            "Registered closer"
        );

        self.closers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((key, closer));
    }

    pub(crate) fn len(&self) -> usize {
        self.closers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Take every closer, leaving the registry empty.
    pub(crate) fn drain(&self) -> Vec<(TypeKey, Closer)> {
        std::mem::take(&mut *self.closers.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Run closers newest first, collecting every failure.
pub(crate) fn close_all(closers: Vec<(TypeKey, Closer)>, ctx: &Context) -> Vec<SharedError> {
    let mut errors = Vec::new();
    for (_key, closer) in closers.into_iter().rev() {
        if let Err(err) = closer(ctx) {
            #[cfg(feature = "logging")]
            warn!(
                target: "scoped_injector",
                service = %_key,
                error = %err,
                "Closer failed"
            );

            errors.push(SharedError::from(err));
        }
    }
    errors
}
