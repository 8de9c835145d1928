//! Benchmarks for the DI container

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use scoped_injector::{Container, Context, Decorator, Service};
use std::hint::black_box;
use std::sync::Arc;

#[allow(dead_code)]
struct SmallService {
    value: i32,
}

#[allow(dead_code)]
struct MediumService {
    name: String,
    values: Vec<i32>,
}

#[allow(dead_code)]
struct LargeService {
    data: Vec<u8>,
}

#[allow(dead_code)]
struct Repository {
    small: Arc<SmallService>,
    medium: Arc<MediumService>,
}

trait Handler: Send + Sync {
    fn id(&self) -> u32;
}

struct NumberedHandler(u32);

impl Handler for NumberedHandler {
    fn id(&self) -> u32 {
        self.0
    }
}

fn populated() -> Container {
    Container::new([
        Service::value(SmallService { value: 42 }).into(),
        Service::value(MediumService {
            name: "test".to_string(),
            values: vec![1, 2, 3, 4, 5],
        })
        .into(),
        Service::factory(|small: Arc<SmallService>, medium: Arc<MediumService>| Repository {
            small,
            medium,
        })
        .into(),
    ])
    .unwrap()
}

fn bench_registration(c: &mut Criterion) {
    let mut group = c.benchmark_group("registration");

    group.bench_function("value", |b| {
        b.iter(|| {
            let container =
                Container::new([Service::value(SmallService { value: 42 }).into()]).unwrap();
            black_box(container)
        })
    });

    group.bench_function("factory", |b| {
        b.iter(|| {
            let container =
                Container::new([Service::factory(|| SmallService { value: 42 }).into()]).unwrap();
            black_box(container)
        })
    });

    group.bench_function("three_with_dependencies", |b| b.iter(|| black_box(populated())));

    group.bench_function("aliased_slice_8", |b| {
        b.iter(|| {
            let container = Container::new((0..8).map(|i| {
                Service::factory(move || NumberedHandler(i))
                    .alias::<dyn Handler>(|h| h)
                    .into()
            }))
            .unwrap();
            black_box(container)
        })
    });

    group.finish();
}

fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");
    group.throughput(Throughput::Elements(1));

    let ctx = Context::background();
    let container = populated();

    group.bench_function("value", |b| {
        b.iter(|| black_box(container.resolve::<SmallService>(&ctx).unwrap()))
    });

    group.bench_function("cached_singleton", |b| {
        b.iter(|| black_box(container.resolve::<Repository>(&ctx).unwrap()))
    });

    group.bench_function("contains_check", |b| {
        b.iter(|| black_box(container.contains::<SmallService>()))
    });

    group.bench_function("not_registered", |b| {
        b.iter(|| black_box(container.resolve::<LargeService>(&ctx).is_err()))
    });

    let decorated = Container::new([
        Service::factory(|| SmallService { value: 1 }).into(),
        Decorator::new(|s: Arc<SmallService>| Arc::new(SmallService { value: s.value + 1 }))
            .into(),
    ])
    .unwrap();

    group.bench_function("decorated_singleton", |b| {
        b.iter(|| black_box(decorated.resolve::<SmallService>(&ctx).unwrap()))
    });

    group.finish();
}

fn bench_transient_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("transient");
    group.throughput(Throughput::Elements(1));

    let ctx = Context::background();
    let container = Container::new([
        Service::value(SmallService { value: 42 }).into(),
        Service::factory(|small: Arc<SmallService>| LargeService {
            data: vec![small.value as u8; 64],
        })
        .transient()
        .into(),
    ])
    .unwrap();

    group.bench_function("resolve_transient", |b| {
        b.iter(|| black_box(container.resolve::<LargeService>(&ctx).unwrap()))
    });

    let handlers = Container::new((0..8).map(|i| {
        Service::factory(move || NumberedHandler(i))
            .alias::<dyn Handler>(|h| h)
            .into()
    }))
    .unwrap();

    group.bench_function("resolve_all_8", |b| {
        b.iter(|| {
            let all = handlers.resolve_all::<dyn Handler>(&ctx).unwrap();
            black_box(all.iter().map(|h| h.id()).sum::<u32>())
        })
    });

    group.finish();
}

fn bench_scoped(c: &mut Criterion) {
    let mut group = c.benchmark_group("scoped");
    let ctx = Context::background();

    group.bench_function("create_scope", |b| {
        let root = populated();
        b.iter(|| black_box(root.new_scope([]).unwrap()))
    });

    group.bench_function("resolve_from_parent", |b| {
        let root = populated();
        let child = root.new_scope([]).unwrap();

        b.iter(|| black_box(child.resolve::<Repository>(&ctx).unwrap()))
    });

    group.bench_function("resolve_override", |b| {
        let root = populated();
        let child = root
            .new_scope([Service::value(SmallService { value: 100 }).into()])
            .unwrap();

        b.iter(|| black_box(child.resolve::<SmallService>(&ctx).unwrap()))
    });

    // Typical request: open a scope, resolve a scoped service, close.
    group.bench_function("request_scope_lifecycle", |b| {
        let root = Container::new([
            Service::value(SmallService { value: 42 }).into(),
            Service::factory(|small: Arc<SmallService>| MediumService {
                name: "request".into(),
                values: vec![small.value],
            })
            .scoped()
            .close_with(|medium: &MediumService| {
                black_box(medium.values.len());
            })
            .into(),
        ])
        .unwrap();

        b.iter(|| {
            let scope = root.new_scope([]).unwrap();
            let _ = scope.resolve::<MediumService>(&ctx).unwrap();
            scope.close(&ctx).unwrap();
        })
    });

    group.finish();
}

fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");

    group.bench_function("concurrent_reads_4", |b| {
        let container = populated();

        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let c = container.clone();
                    thread::spawn(move || {
                        let ctx = Context::background();
                        for _ in 0..100 {
                            let _ = c.resolve::<Repository>(&ctx).unwrap();
                        }
                    })
                })
                .collect();

            for h in handles {
                h.join().unwrap();
            }
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_registration,
    bench_resolution,
    bench_transient_resolution,
    bench_scoped,
    bench_concurrent,
);

criterion_main!(benches);
