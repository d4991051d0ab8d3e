//! Fan-out benchmarks: cost of a lock-step publish round
//!
//! Run with: `cargo bench --bench fanout`

#![allow(missing_docs)] // Benchmarks don't need extensive docs
#![allow(clippy::expect_used)] // Benchmarks can use expect for setup

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use streamfold_core::{NoopObserver, reducer_fn};
use streamfold_runtime::{BroadcastConfig, Broadcaster, Engine, EngineConfig};

// ============================================================================
// Benchmark Fixtures
// ============================================================================

const ITEMS: u64 = 100;

fn quiet_broadcast() -> BroadcastConfig {
    BroadcastConfig::default()
        .with_label("bench")
        .with_observer(Arc::new(NoopObserver))
}

fn quiet_engine() -> EngineConfig {
    EngineConfig::default()
        .with_label("bench")
        .with_observer(Arc::new(NoopObserver))
}

// ============================================================================
// Benchmarks
// ============================================================================

/// Publish `ITEMS` rounds to N draining subscribers.
fn bench_broadcast_rounds(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast_rounds");
    group.measurement_time(Duration::from_secs(10));

    let runtime = tokio::runtime::Runtime::new().expect("Failed to create runtime");

    for subscribers in [1_usize, 10, 100] {
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, &subscribers| {
                b.to_async(&runtime).iter(|| async move {
                    let broadcaster = Broadcaster::new(quiet_broadcast());
                    let consumers: Vec<_> = (0..subscribers)
                        .map(|_| tokio::spawn(broadcaster.subscribe().count()))
                        .collect();

                    for n in 0..ITEMS {
                        broadcaster.publish(black_box(n)).await.ok();
                    }
                    broadcaster.close();

                    for consumer in consumers {
                        consumer.await.ok();
                    }
                });
            },
        );
    }

    group.finish();
}

/// Fold `ITEMS` events through an engine with N subscribers.
fn bench_engine_fold(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_fold");
    group.measurement_time(Duration::from_secs(10));

    let runtime = tokio::runtime::Runtime::new().expect("Failed to create runtime");

    for subscribers in [0_usize, 10] {
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, &subscribers| {
                b.to_async(&runtime).iter(|| async move {
                    let engine = Engine::with_config(
                        0_u64,
                        reducer_fn(|total: &mut u64, n: &u64| {
                            *total += n;
                            Ok(())
                        }),
                        quiet_engine(),
                    );
                    let consumers: Vec<_> = (0..subscribers)
                        .map(|_| tokio::spawn(engine.subscribe().changes.count()))
                        .collect();

                    engine
                        .start(futures::stream::iter((0..ITEMS).map(Ok)))
                        .ok();
                    black_box(engine.terminated().await);

                    for consumer in consumers {
                        consumer.await.ok();
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_broadcast_rounds, bench_engine_fold);
criterion_main!(benches);
