#![no_main]

//! Fuzz target for scope trees and teardown
//!
//! Grows a tree of scopes, resolves services of every lifetime from arbitrary
//! scopes and closes scopes in arbitrary order. At the end every constructed
//! instance must have been closed exactly once.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use scoped_injector::{Container, Context, DiError, Service};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Shared;
struct PerScope;
struct Fresh;

#[derive(Default)]
struct Counters {
    built: AtomicUsize,
    closed: AtomicUsize,
}

#[derive(Debug, Arbitrary)]
enum ScopeOp {
    Spawn { parent: u8, override_shared: bool },
    ResolveShared(u8),
    ResolvePerScope(u8),
    ResolveFresh(u8),
    Close(u8),
}

fn registrations(counters: &Arc<Counters>) -> Vec<scoped_injector::Registration> {
    let (b1, b2, b3) = (counters.clone(), counters.clone(), counters.clone());
    let (c1, c2, c3) = (counters.clone(), counters.clone(), counters.clone());
    vec![
        Service::factory(move || {
            b1.built.fetch_add(1, Ordering::SeqCst);
            Shared
        })
        .close_with(move |_: &Shared| {
            c1.closed.fetch_add(1, Ordering::SeqCst);
        })
        .into(),
        Service::factory(move |_shared: Arc<Shared>| {
            b2.built.fetch_add(1, Ordering::SeqCst);
            PerScope
        })
        .scoped()
        .close_with(move |_: &PerScope| {
            c2.closed.fetch_add(1, Ordering::SeqCst);
        })
        .into(),
        Service::factory(move |_scoped: Arc<PerScope>| {
            b3.built.fetch_add(1, Ordering::SeqCst);
            Fresh
        })
        .transient()
        .close_with(move |_: &Fresh| {
            c3.closed.fetch_add(1, Ordering::SeqCst);
        })
        .into(),
    ]
}

fuzz_target!(|ops: Vec<ScopeOp>| {
    let ctx = Context::background();
    let counters = Arc::new(Counters::default());
    let Ok(root) = Container::new(registrations(&counters)) else {
        return;
    };
    let mut scopes = vec![root];

    for op in ops.into_iter().take(128) {
        let pick = |index: u8| &scopes[index as usize % scopes.len()];
        match op {
            ScopeOp::Spawn {
                parent,
                override_shared,
            } => {
                let parent = pick(parent);
                let parent_closed = parent.is_closed();
                let child = if override_shared {
                    let (b, c) = (counters.clone(), counters.clone());
                    parent.new_scope([Service::factory(move || {
                        b.built.fetch_add(1, Ordering::SeqCst);
                        Shared
                    })
                    .close_with(move |_: &Shared| {
                        c.closed.fetch_add(1, Ordering::SeqCst);
                    })
                    .into()])
                } else {
                    parent.new_scope([])
                };
                match child {
                    Ok(child) => scopes.push(child),
                    Err(err) => {
                        assert!(parent_closed);
                        assert!(matches!(err, DiError::Closed));
                    }
                }
            }
            ScopeOp::ResolveShared(index) => {
                let scope = pick(index);
                if scope.is_closed() {
                    assert!(scope.resolve::<Shared>(&ctx).is_err());
                } else {
                    let _ = scope.resolve::<Shared>(&ctx);
                }
            }
            ScopeOp::ResolvePerScope(index) => {
                let scope = pick(index);
                let first = scope.resolve::<PerScope>(&ctx);
                let second = scope.resolve::<PerScope>(&ctx);
                if let (Ok(a), Ok(b)) = (&first, &second) {
                    assert!(Arc::ptr_eq(a, b));
                }
                if scope.depth() == 0 {
                    assert!(first.is_err());
                }
            }
            ScopeOp::ResolveFresh(index) => {
                let scope = pick(index);
                if let (Ok(a), Ok(b)) = (
                    scope.resolve::<Fresh>(&ctx),
                    scope.resolve::<Fresh>(&ctx),
                ) {
                    assert!(!Arc::ptr_eq(&a, &b));
                }
            }
            ScopeOp::Close(index) => {
                let scope = pick(index);
                let was_closed = scope.is_closed();
                let result = scope.close(&ctx);
                assert_eq!(was_closed, matches!(result, Err(DiError::Closed)));
            }
        }
    }

    // Close whatever is still open.
    for scope in scopes.iter().rev() {
        let _ = scope.close(&ctx);
    }
    assert_eq!(
        counters.built.load(Ordering::SeqCst),
        counters.closed.load(Ordering::SeqCst)
    );
});
