//! Error types for dependency injection

use crate::context::ContextError;
use crate::key::TypeKey;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error returned by user constructors, decorators and closers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Shared form of a user error, so cached failures can be replayed.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during dependency injection operations
#[derive(Error, Debug, Clone)]
pub enum DiError {
    /// No registration for the key in this scope or its ancestors
    #[error("service not registered: {key}")]
    NotRegistered { key: TypeKey },

    /// The key is already being resolved further up the same call stack
    #[error("dependency cycle detected: {}", format_chain(.chain))]
    Cycle { chain: Vec<TypeKey> },

    /// The container (or the scope owning the service) has been closed
    #[error("container is closed")]
    Closed,

    /// A user constructor or decorator failed
    #[error("{source}")]
    Constructor {
        key: TypeKey,
        #[source]
        source: SharedError,
    },

    /// Registration-time validation failures, all of them
    #[error("invalid registrations: {}", format_joined(.0))]
    Validation(Vec<ValidationError>),

    /// A scoped service was requested from the scope that registered it
    #[error("scoped service {key} must be resolved from a child scope")]
    ScopedFromOwner { key: TypeKey },

    /// An injected scope handle was used before its constructor returned
    #[error("resolving {key} through an injected scope is not supported within constructor function")]
    ResolveInsideConstructor { key: TypeKey },

    /// The ambient context was canceled or its deadline passed
    #[error(transparent)]
    Context(#[from] ContextError),

    /// Resolution of a dependency failed; `source` is the dependency's error
    #[error("resolving {service}: dependency {dependency}: {source}")]
    Dependency {
        service: TypeKey,
        dependency: TypeKey,
        #[source]
        source: Box<DiError>,
    },

    /// A resolved value did not have the type its key promised
    #[error("resolved value for {key} has an unexpected type")]
    TypeMismatch { key: TypeKey },

    /// One or more closers failed; all failures are kept in close order
    #[error("closing container: {}", format_joined(.0))]
    Close(Vec<SharedError>),
}

/// Coarse classification of a [`DiError`], looking through dependency wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ServiceNotRegistered,
    DependencyCycle,
    ContainerClosed,
    ConstructorError,
    ValidationError,
    ScopeMisuse,
    ContextError,
    TypeMismatch,
    CloseError,
}

impl DiError {
    #[inline]
    pub fn not_registered(key: TypeKey) -> Self {
        Self::NotRegistered { key }
    }

    #[inline]
    pub fn constructor(key: TypeKey, source: impl Into<BoxError>) -> Self {
        Self::Constructor {
            key,
            source: Arc::from(source.into()),
        }
    }

    #[inline]
    pub(crate) fn dependency(service: TypeKey, dependency: TypeKey, source: DiError) -> Self {
        Self::Dependency {
            service,
            dependency,
            source: Box::new(source),
        }
    }

    /// The innermost error, looking through every `Dependency` wrapper.
    pub fn root_cause(&self) -> &DiError {
        let mut current = self;
        while let Self::Dependency { source, .. } = current {
            current = source;
        }
        current
    }

    /// Kind of the root cause.
    pub fn kind(&self) -> ErrorKind {
        match self.root_cause() {
            Self::NotRegistered { .. } => ErrorKind::ServiceNotRegistered,
            Self::Cycle { .. } => ErrorKind::DependencyCycle,
            Self::Closed => ErrorKind::ContainerClosed,
            Self::Constructor { .. } => ErrorKind::ConstructorError,
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::ScopedFromOwner { .. } | Self::ResolveInsideConstructor { .. } => {
                ErrorKind::ScopeMisuse
            }
            Self::Context(_) => ErrorKind::ContextError,
            Self::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Self::Close(_) => ErrorKind::CloseError,
            Self::Dependency { .. } => unreachable!("root_cause never returns a Dependency"),
        }
    }

    /// The context error at the root, if resolution stopped because of the context.
    pub fn context_error(&self) -> Option<ContextError> {
        match self.root_cause() {
            Self::Context(err) => Some(*err),
            _ => None,
        }
    }

    /// The user error at the root, downcast to `E`.
    pub fn constructor_error<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self.root_cause() {
            Self::Constructor { source, .. } => source.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// The dependency chain leading to the root cause, outermost first.
    pub fn chain(&self) -> Vec<&TypeKey> {
        let mut keys = Vec::new();
        let mut current = self;
        while let Self::Dependency {
            service,
            dependency,
            source,
        } = current
        {
            if keys.is_empty() {
                keys.push(service);
            }
            keys.push(dependency);
            current = source;
        }
        keys
    }
}

/// A single registration-time problem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{type_name} cannot be registered as a service: {reason}")]
    UnsupportedKind {
        type_name: &'static str,
        reason: &'static str,
    },

    #[error("alias {alias} declared more than once for {service}")]
    DuplicateAlias {
        service: &'static str,
        alias: &'static str,
    },

    #[error("alias {alias} is the produced type of {service} itself")]
    RedundantAlias {
        service: &'static str,
        alias: &'static str,
    },

    #[error("tag {tag} refers to {parameter}, which is not a parameter of the constructor for {service}")]
    UnknownParameter {
        service: &'static str,
        parameter: &'static str,
        tag: String,
    },

    #[error("decorator for {target} must reference its target exactly once")]
    DecoratorSelfDependency { target: String },
}

fn format_chain(chain: &[TypeKey]) -> String {
    chain
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn format_joined<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias for DI operations
pub type Result<T> = std::result::Result<T, DiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    struct A;
    struct B;
    struct C;

    #[derive(Debug, Error)]
    #[error("connection refused")]
    struct ConnectError;

    #[test]
    fn test_root_cause_through_wrapping() {
        let root = DiError::Cycle {
            chain: vec![TypeKey::of::<A>(), TypeKey::of::<B>(), TypeKey::of::<A>()],
        };
        let wrapped = DiError::dependency(
            TypeKey::of::<C>(),
            TypeKey::of::<A>(),
            DiError::dependency(TypeKey::of::<A>(), TypeKey::of::<B>(), root),
        );

        assert_eq!(wrapped.kind(), ErrorKind::DependencyCycle);
        assert!(matches!(wrapped.root_cause(), DiError::Cycle { .. }));
        assert_eq!(wrapped.chain().len(), 3);

        let message = wrapped.to_string();
        assert!(message.contains("resolving"));
        assert!(message.contains("dependency cycle detected"));
    }

    #[test]
    fn test_constructor_error_downcast() {
        let err = DiError::dependency(
            TypeKey::of::<A>(),
            TypeKey::of::<B>(),
            DiError::constructor(TypeKey::of::<B>(), ConnectError),
        );

        assert!(err.constructor_error::<ConnectError>().is_some());
        assert_eq!(err.kind(), ErrorKind::ConstructorError);
        assert!(err.source().is_some());
    }

    #[test]
    fn test_constructor_error_displays_unwrapped() {
        let err = DiError::constructor(TypeKey::of::<A>(), ConnectError);
        assert_eq!(err.to_string(), "connection refused");
    }

    #[test]
    fn test_context_error_identity() {
        let err = DiError::dependency(
            TypeKey::of::<A>(),
            TypeKey::of::<B>(),
            DiError::from(ContextError::DeadlineExceeded),
        );
        assert_eq!(err.context_error(), Some(ContextError::DeadlineExceeded));
    }

    #[test]
    fn test_validation_errors_are_joined() {
        let err = DiError::Validation(vec![
            ValidationError::DecoratorSelfDependency {
                target: "A".into(),
            },
            ValidationError::RedundantAlias {
                service: "B",
                alias: "B",
            },
        ]);
        let message = err.to_string();
        assert!(message.contains("decorator for A"));
        assert!(message.contains("; alias B"));
    }
}
