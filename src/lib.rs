//! # Scoped Injector - Hierarchical Dependency Injection for Rust
//!
//! A type-keyed dependency injection container with lazily constructed
//! services, chained scopes and deterministic teardown.
//!
//! ## Features
//!
//! - **Type-keyed** - services are addressed by type plus an optional tag
//! - **Three lifetimes** - singleton, scoped (one per child scope), transient
//! - **At-most-once construction** - concurrent resolvers of a cached service
//!   share one construction and observe the same instance or error
//! - **Cycle detection** - a dependency cycle is reported with its full chain
//! - **Decorators, aliases and slices** - wrap services, expose them under
//!   trait objects and collect every registration of a type
//! - **Ordered close** - closers run newest first when a scope is closed
//! - **Observable** - optional `tracing` events with JSON or pretty output
//!
//! ## Quick Start
//!
//! ```rust
//! use scoped_injector::{Container, Context, Service};
//! use std::sync::Arc;
//!
//! struct Config {
//!     url: String,
//! }
//!
//! struct Database {
//!     url: String,
//! }
//!
//! let container = Container::new([
//!     Service::value(Config { url: "postgres://localhost".into() }).into(),
//!     Service::factory(|config: Arc<Config>| Database { url: config.url.clone() }).into(),
//! ])
//! .unwrap();
//!
//! let db = container.resolve::<Database>(&Context::background()).unwrap();
//! assert_eq!(db.url, "postgres://localhost");
//! ```
//!
//! ## Scopes
//!
//! ```rust
//! use scoped_injector::{Container, Context, Service};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! static NEXT_ID: AtomicU64 = AtomicU64::new(1);
//!
//! struct RequestId(u64);
//!
//! let root = Container::new([
//!     Service::factory(|| RequestId(NEXT_ID.fetch_add(1, Ordering::SeqCst)))
//!         .scoped()
//!         .into(),
//! ])
//! .unwrap();
//!
//! let ctx = Context::background();
//! let first = root.new_scope([]).unwrap();
//! let second = root.new_scope([]).unwrap();
//!
//! let id = first.resolve::<RequestId>(&ctx).unwrap();
//! assert!(Arc::ptr_eq(&id, &first.resolve::<RequestId>(&ctx).unwrap()));
//! assert_ne!(id.0, second.resolve::<RequestId>(&ctx).unwrap().0);
//!
//! first.close(&ctx).unwrap();
//! second.close(&ctx).unwrap();
//! ```

mod closer;
mod container;
mod context;
mod descriptor;
mod error;
mod factory;
mod invoke;
mod key;
#[cfg(feature = "logging")]
pub mod logging;
mod provider;
mod registration;
mod resolve;
mod scope;
mod storage;

pub use closer::{shape, Close, CloseFn};
pub use container::{Container, ContainerBuilder};
pub use context::{CancelHandle, Context, ContextError};
pub use error::{BoxError, DiError, ErrorKind, Result, SharedError, ValidationError};
pub use factory::{Constructor, DecoratorFn, TryConstructor, TryDecoratorFn};
pub use invoke::InvokeFn;
pub use key::{Tag, TypeKey};
pub use provider::{AnyService, Inject, Injectable, Lifetime};
pub use registration::{Decorator, Registration, Service};
pub use scope::{ScopeHandle, ScopeId};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Close, Container, Context, Decorator, DiError, Lifetime, Registration, Result,
        ScopeHandle, Service, Tag,
    };
    pub use std::sync::Arc;
}
