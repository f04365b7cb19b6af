use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pipeflow::{channel_on, InlineScheduler, ThreadPool};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn benchmark_fan_out_two_branches(c: &mut Criterion) {
    c.bench_function("fan_out_two_branches_1000_msgs", |b| {
        b.iter(|| {
            let scheduler = Arc::new(InlineScheduler);
            let (tx, rx) = channel_on::<u64>(scheduler);
            let sink_a = rx.pipe(|x: u64| {
                black_box(x + 1);
            });
            let sink_b = rx.pipe(|x: u64| {
                black_box(x * 2);
            });
            drop(rx);

            for i in 0..1000u64 {
                tx.send(black_box(i));
            }
            drop(tx);
            drop(sink_a);
            drop(sink_b);
        });
    });
}

fn benchmark_slow_consumer_cts_window(c: &mut Criterion) {
    c.bench_function("slow_consumer_500_msgs", |b| {
        b.iter(|| {
            let pool = Arc::new(ThreadPool::with_threads(2));
            let (tx, rx) = channel_on::<u64>(pool);

            let done = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&done);
            let sink = rx.pipe(move |x: u64| {
                // Slow consumer: the upstream stays suspended on its CTS
                // window while this runs.
                std::thread::sleep(Duration::from_micros(10));
                black_box(x);
                counter.fetch_add(1, Ordering::Relaxed);
            });
            drop(rx);

            for i in 0..500u64 {
                tx.send(black_box(i));
            }
            drop(tx);

            while done.load(Ordering::Relaxed) < 500 {
                std::thread::yield_now();
            }
            drop(sink);
        });
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(15))
        .sample_size(20);
    targets = benchmark_fan_out_two_branches, benchmark_slow_consumer_cts_window
);
criterion_main!(benches);
