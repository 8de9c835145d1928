//! Ambient cancellation and deadline context
//!
//! Every resolution receives a [`Context`]. The engine checks it before a
//! resolution starts and again right before a constructor runs. Constructors
//! and `invoke` targets can take a `Context` parameter to receive the caller's
//! context.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Why a context stopped being usable.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

struct ContextInner {
    canceled: AtomicBool,
    deadline: Option<Instant>,
    children: Mutex<Vec<Weak<ContextInner>>>,
    #[cfg(feature = "async")]
    notify: tokio::sync::Notify,
}

impl ContextInner {
    fn new(deadline: Option<Instant>, canceled: bool) -> Self {
        Self {
            canceled: AtomicBool::new(canceled),
            deadline,
            children: Mutex::new(Vec::new()),
            #[cfg(feature = "async")]
            notify: tokio::sync::Notify::new(),
        }
    }

    fn cancel(&self) {
        if self.canceled.swap(true, Ordering::SeqCst) {
            return;
        }

        #[cfg(feature = "async")]
        self.notify.notify_waiters();

        let children = std::mem::take(
            &mut *self.children.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

/// Cancellation/deadline carrier threaded through every resolve call.
///
/// Cheap to clone; clones observe the same cancellation state. Cancelling a
/// context cancels every context derived from it.
///
/// ```rust
/// use scoped_injector::{Context, ContextError};
///
/// let root = Context::background();
/// let (ctx, cancel) = root.with_cancel();
/// assert!(ctx.check().is_ok());
///
/// cancel.cancel();
/// assert_eq!(ctx.err(), Some(ContextError::Canceled));
/// assert!(root.err().is_none());
/// ```
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// A context that is never canceled and has no deadline.
    pub fn background() -> Self {
        Self {
            inner: Arc::new(ContextInner::new(None, false)),
        }
    }

    /// Derive a cancelable child context.
    pub fn with_cancel(&self) -> (Context, CancelHandle) {
        let child = self.derive(self.inner.deadline);
        let handle = CancelHandle {
            inner: Arc::clone(&child.inner),
        };
        (child, handle)
    }

    /// Derive a child that expires at `deadline` (or earlier if the parent does).
    pub fn with_deadline(&self, deadline: Instant) -> Context {
        let effective = match self.inner.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };
        self.derive(Some(effective))
    }

    /// Derive a child that expires after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Context {
        self.with_deadline(Instant::now() + timeout)
    }

    fn derive(&self, deadline: Option<Instant>) -> Context {
        let mut children = self
            .inner
            .children
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let canceled = self.inner.canceled.load(Ordering::SeqCst);
        let inner = Arc::new(ContextInner::new(deadline, canceled));
        if !canceled {
            children.retain(|child| child.strong_count() > 0);
            children.push(Arc::downgrade(&inner));
        }
        Context { inner }
    }

    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// `Some` once the context is canceled or past its deadline.
    pub fn err(&self) -> Option<ContextError> {
        if self.inner.canceled.load(Ordering::SeqCst) {
            return Some(ContextError::Canceled);
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// `Err` once the context is canceled or past its deadline.
    #[inline]
    pub fn check(&self) -> Result<(), ContextError> {
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Wait until the context is canceled or its deadline passes.
    #[cfg(feature = "async")]
    pub async fn cancelled(&self) -> ContextError {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(err) = self.err() {
                return err;
            }

            match self.inner.deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = notified => {}
                        _ = tokio::time::sleep_until(deadline.into()) => {}
                    }
                }
                None => notified.await,
            }
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("deadline", &self.inner.deadline)
            .field("err", &self.err())
            .finish()
    }
}

/// Cancels the context it was created with, and all contexts derived from it.
pub struct CancelHandle {
    inner: Arc<ContextInner>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.inner.cancel();
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("canceled", &self.inner.canceled.load(Ordering::SeqCst))
            .finish()
    }
}
