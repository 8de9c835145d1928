//! Calling arbitrary functions with injected parameters

use crate::container::Container;
use crate::context::Context;
use crate::error::{DiError, Result};
use crate::factory::arg;
use crate::key::TypeKey;
use crate::provider::{AnyService, Inject};
use crate::resolve::resolve_parameter;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// A function whose parameters can all be injected.
///
/// Implemented for `FnOnce` closures of 0 to 10 [`Inject`] parameters.
pub trait InvokeFn<Args, R> {
    fn dependencies() -> Vec<TypeKey>;

    fn call_with(self, args: &[AnyService]) -> Result<R>;
}

macro_rules! impl_invoke_fn {
    ($($arg:ident => $idx:tt),*) => {
        impl<F, R, $($arg,)*> InvokeFn<($($arg,)*), R> for F
        where
            F: FnOnce($($arg),*) -> R,
            $($arg: Inject,)*
        {
            #[inline]
            fn dependencies() -> Vec<TypeKey> {
                vec![$(<$arg as Inject>::key()),*]
            }

            #[allow(unused_variables)]
            #[inline]
            fn call_with(self, args: &[AnyService]) -> Result<R> {
                Ok(self($(arg::<$arg>(args, $idx)?),*))
            }
        }
    };
}

impl_invoke_fn!();
impl_invoke_fn!(A1 => 0);
impl_invoke_fn!(A1 => 0, A2 => 1);
impl_invoke_fn!(A1 => 0, A2 => 1, A3 => 2);
impl_invoke_fn!(A1 => 0, A2 => 1, A3 => 2, A4 => 3);
impl_invoke_fn!(A1 => 0, A2 => 1, A3 => 2, A4 => 3, A5 => 4);
impl_invoke_fn!(A1 => 0, A2 => 1, A3 => 2, A4 => 3, A5 => 4, A6 => 5);
impl_invoke_fn!(A1 => 0, A2 => 1, A3 => 2, A4 => 3, A5 => 4, A6 => 5, A7 => 6);
impl_invoke_fn!(A1 => 0, A2 => 1, A3 => 2, A4 => 3, A5 => 4, A6 => 5, A7 => 6, A8 => 7);
impl_invoke_fn!(A1 => 0, A2 => 1, A3 => 2, A4 => 3, A5 => 4, A6 => 5, A7 => 6, A8 => 7, A9 => 8);
impl_invoke_fn!(A1 => 0, A2 => 1, A3 => 2, A4 => 3, A5 => 4, A6 => 5, A7 => 6, A8 => 7, A9 => 8, A10 => 9);

impl Container {
    /// Resolve every parameter of `f` from this scope and call it.
    ///
    /// `Context` and `ScopeHandle` parameters receive `ctx` and a handle to this
    /// scope; the handle is usable immediately.
    ///
    /// ```rust
    /// use scoped_injector::{Container, Context, Service};
    /// use std::sync::Arc;
    ///
    /// struct Port(u16);
    ///
    /// let container = Container::new([Service::value(Port(8080)).into()]).unwrap();
    /// let port = container
    ///     .invoke(&Context::background(), |port: Arc<Port>| port.0)
    ///     .unwrap();
    /// assert_eq!(port, 8080);
    /// ```
    pub fn invoke<F, Args, R>(&self, ctx: &Context, f: F) -> Result<R>
    where
        F: InvokeFn<Args, R>,
    {
        ctx.check()?;
        self.inner.ensure_open()?;

        let ready = Arc::new(AtomicBool::new(true));
        let args = F::dependencies()
            .iter()
            .map(|key| resolve_parameter(&self.inner, ctx, key, &mut Vec::new(), &ready))
            .collect::<Result<Vec<_>>>()?;
        f.call_with(&args)
    }

    /// Like [`invoke`](Self::invoke) for functions returning `Result`.
    ///
    /// The function's own error is returned unchanged; resolution failures are
    /// converted with `E::from`.
    pub fn try_invoke<F, Args, R, E>(&self, ctx: &Context, f: F) -> std::result::Result<R, E>
    where
        F: InvokeFn<Args, std::result::Result<R, E>>,
        E: From<DiError>,
    {
        self.invoke(ctx, f).unwrap_or_else(|err| Err(E::from(err)))
    }
}
