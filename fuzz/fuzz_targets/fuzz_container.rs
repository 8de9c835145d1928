#![no_main]

//! Fuzz target for registration and resolution
//!
//! Builds a container from an arbitrary list of registrations, including
//! tags, aliases, decorators and dependency edges that may form cycles, then
//! resolves arbitrary keys and checks the caching guarantees.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use scoped_injector::{Container, Context, DiError, Lifetime, Registration, Service};
use std::sync::Arc;

trait Node: Send + Sync {
    fn weight(&self) -> u32;
}

struct Left(u32);
struct Right(u32);

impl Node for Left {
    fn weight(&self) -> u32 {
        self.0
    }
}

impl Node for Right {
    fn weight(&self) -> u32 {
        self.0
    }
}

#[derive(Debug, Arbitrary)]
enum Life {
    Singleton,
    Scoped,
    Transient,
}

impl From<&Life> for Lifetime {
    fn from(life: &Life) -> Self {
        match life {
            Life::Singleton => Lifetime::Singleton,
            Life::Scoped => Lifetime::Scoped,
            Life::Transient => Lifetime::Transient,
        }
    }
}

#[derive(Debug, Arbitrary)]
enum Reg {
    LeftValue(u32, Option<String>),
    RightValue(u32, Option<String>),
    /// Left depends on Right
    LeftFromRight(Life, Option<String>),
    /// Right depends on Left, closing the loop when both exist
    RightFromLeft(Life),
    LeftAsNode(Life),
    RightAsNode(Life, Option<String>),
    DecorateLeft,
    FailingRight,
}

#[derive(Debug, Arbitrary)]
enum Query {
    Left(Option<String>),
    Right(Option<String>),
    Node(Option<String>),
    AllNodes,
}

#[derive(Debug, Arbitrary)]
struct Input {
    registrations: Vec<Reg>,
    queries: Vec<Query>,
    child: bool,
}

fn build(reg: &Reg) -> Registration {
    fn tagged<T: ?Sized + Send + Sync + 'static>(
        service: Service<T>,
        tag: &Option<String>,
    ) -> Service<T> {
        match tag {
            Some(tag) => service.tag(tag.clone()),
            None => service,
        }
    }

    match reg {
        Reg::LeftValue(v, tag) => tagged(Service::value(Left(*v)), tag).into(),
        Reg::RightValue(v, tag) => tagged(Service::value(Right(*v)), tag).into(),
        Reg::LeftFromRight(life, tag) => tagged(
            Service::factory(|r: Arc<Right>| Left(r.0.wrapping_add(1))).lifetime(life.into()),
            tag,
        )
        .into(),
        Reg::RightFromLeft(life) => Service::factory(|l: Arc<Left>| Right(l.0.wrapping_mul(2)))
            .lifetime(life.into())
            .into(),
        Reg::LeftAsNode(life) => Service::factory(|| Left(7))
            .lifetime(life.into())
            .alias::<dyn Node>(|l| l)
            .into(),
        Reg::RightAsNode(life, tag) => tagged(
            Service::factory(|| Right(9))
                .lifetime(life.into())
                .alias::<dyn Node>(|r| r),
            tag,
        )
        .into(),
        Reg::DecorateLeft => scoped_injector::Decorator::new(|l: Arc<Left>| {
            Arc::new(Left(l.0.wrapping_add(100)))
        })
        .into(),
        Reg::FailingRight => Service::try_factory(|| {
            Err::<Right, _>(std::io::Error::other("unavailable"))
        })
        .into(),
    }
}

fn check<S: ?Sized>(first: &Result<Arc<S>, DiError>, second: &Result<Arc<S>, DiError>) {
    // A failure for a key never turns into a success within one scope.
    if first.is_err() {
        assert!(second.is_err());
    }
}

fuzz_target!(|input: Input| {
    let ctx = Context::background();
    let registrations: Vec<_> = input.registrations.iter().take(32).map(build).collect();

    let Ok(root) = Container::new(registrations) else {
        return;
    };
    let container = if input.child {
        match root.new_scope([]) {
            Ok(child) => child,
            Err(_) => return,
        }
    } else {
        root.clone()
    };

    for query in input.queries.iter().take(64) {
        match query {
            Query::Left(tag) => {
                let resolve = || match tag {
                    Some(tag) => container.resolve_tagged::<Left>(&ctx, tag.clone()),
                    None => container.resolve::<Left>(&ctx),
                };
                let (a, b) = (resolve(), resolve());
                check(&a, &b);
            }
            Query::Right(tag) => {
                let resolve = || match tag {
                    Some(tag) => container.resolve_tagged::<Right>(&ctx, tag.clone()),
                    None => container.resolve::<Right>(&ctx),
                };
                let (a, b) = (resolve(), resolve());
                check(&a, &b);
            }
            Query::Node(tag) => {
                let node = match tag {
                    Some(tag) => container.resolve_tagged::<dyn Node>(&ctx, tag.clone()),
                    None => container.resolve::<dyn Node>(&ctx),
                };
                if let Ok(node) = node {
                    let _ = node.weight();
                }
            }
            Query::AllNodes => {
                if let Ok(nodes) = container.resolve_all::<dyn Node>(&ctx) {
                    assert!(!nodes.is_empty());
                }
            }
        }
    }

    if input.child {
        let _ = container.close(&ctx);
    }
    assert!(root.close(&ctx).is_ok());
    assert!(matches!(root.close(&ctx), Err(DiError::Closed)));
});
