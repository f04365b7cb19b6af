use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pipeflow::{channel_on, InlineScheduler, ThreadPool};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn benchmark_identity_channel(c: &mut Criterion) {
    c.bench_function("identity_channel_1000_msgs", |b| {
        b.iter(|| {
            let scheduler = Arc::new(InlineScheduler);
            let (tx, rx) = channel_on::<u64>(scheduler);
            let sink = rx.pipe(|x: u64| {
                black_box(x);
            });
            drop(rx);

            for i in 0..1000u64 {
                tx.send(black_box(i));
            }
            drop(tx);
            drop(sink);
        });
    });
}

fn benchmark_three_stage_chain(c: &mut Criterion) {
    c.bench_function("three_stage_1000_msgs", |b| {
        b.iter(|| {
            let scheduler = Arc::new(InlineScheduler);
            let (tx, rx) = channel_on::<u64>(scheduler);
            let sink = rx | (|x: u64| x + 1) | (|x: u64| x * 2) | (|x: u64| {
                black_box(x);
            });

            for i in 0..1000u64 {
                tx.send(black_box(i));
            }
            drop(tx);
            drop(sink);
        });
    });
}

fn benchmark_thread_pool_throughput(c: &mut Criterion) {
    c.bench_function("thread_pool_1000_msgs", |b| {
        b.iter(|| {
            let pool = Arc::new(ThreadPool::with_threads(4));
            let (tx, rx) = channel_on::<u64>(pool);

            let done = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&done);
            let sink = rx.pipe(move |x: u64| {
                black_box(x);
                counter.fetch_add(1, Ordering::Relaxed);
            });
            drop(rx);

            for i in 0..1000u64 {
                tx.send(black_box(i));
            }
            drop(tx);

            while done.load(Ordering::Relaxed) < 1000 {
                std::thread::yield_now();
            }
            drop(sink);
        });
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(10));
    targets = benchmark_identity_channel, benchmark_three_stage_chain, benchmark_thread_pool_throughput
);
criterion_main!(benches);
