//! Fan-out pipeline demonstrating broadcast to parallel branches
//!
//! One feed of simulated sensor readings is broadcast to two branches:
//! 1. Stats: running count / sum / min / max
//! 2. Spikes: flags readings that jump more than 50 from the previous one
//!
//! Runs on a [`ThreadPool`], so branches execute concurrently while the
//! continue-to-send window keeps each edge to one value in flight.
//!
//! Usage: cargo run --example fan_out --release

use pipeflow::{channel_on, Process, ProcessState, ThreadPool};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Accumulates summary statistics and reports them on close
struct RunningStats {
    count: u64,
    sum: i64,
    min: i64,
    max: i64,
    done: Arc<AtomicBool>,
}

impl RunningStats {
    fn new(done: Arc<AtomicBool>) -> Self {
        Self {
            count: 0,
            sum: 0,
            min: i64::MAX,
            max: i64::MIN,
            done,
        }
    }
}

impl Process for RunningStats {
    type Input = i64;
    type Output = ();

    fn await_value(&mut self, reading: i64) {
        self.count += 1;
        self.sum += reading;
        self.min = self.min.min(reading);
        self.max = self.max.max(reading);
    }

    fn yield_value(&mut self) {}

    fn state(&self) -> ProcessState {
        ProcessState::Await
    }

    fn close(&mut self) {
        println!("\n=== Stats branch ===");
        println!("Readings: {}", self.count);
        if self.count > 0 {
            println!("Sum: {}", self.sum);
            println!("Min: {}, Max: {}", self.min, self.max);
            println!("Average: {:.2}", self.sum as f64 / self.count as f64);
        }
        self.done.store(true, Ordering::SeqCst);
    }
}

/// Flags readings that jump more than a threshold from the previous one
struct SpikeDetector {
    previous: Option<i64>,
    spikes: u64,
    done: Arc<AtomicBool>,
}

impl SpikeDetector {
    const THRESHOLD: i64 = 50;

    fn new(done: Arc<AtomicBool>) -> Self {
        Self {
            previous: None,
            spikes: 0,
            done,
        }
    }
}

impl Process for SpikeDetector {
    type Input = i64;
    type Output = ();

    fn await_value(&mut self, reading: i64) {
        if let Some(previous) = self.previous {
            if (reading - previous).abs() > Self::THRESHOLD {
                self.spikes += 1;
                println!("Spike: {} -> {}", previous, reading);
            }
        }
        self.previous = Some(reading);
    }

    fn yield_value(&mut self) {}

    fn state(&self) -> ProcessState {
        ProcessState::Await
    }

    fn close(&mut self) {
        println!("\n=== Spike branch ===");
        println!("Spikes detected: {}", self.spikes);
        self.done.store(true, Ordering::SeqCst);
    }
}

fn main() {
    tracing_subscriber::fmt().init();

    println!("Sensor Fan-Out Pipeline");
    println!("=======================");

    let pool = Arc::new(ThreadPool::with_threads(2));
    let scheduler: Arc<dyn pipeflow::Scheduler> = Arc::clone(&pool) as Arc<dyn pipeflow::Scheduler>;
    let (tx, rx) = channel_on::<i64>(scheduler);

    let stats_done = Arc::new(AtomicBool::new(false));
    let spikes_done = Arc::new(AtomicBool::new(false));

    let mut stats = rx.pipe_process(RunningStats::new(Arc::clone(&stats_done)));
    let mut spikes = rx.pipe_process(SpikeDetector::new(Arc::clone(&spikes_done)));
    stats.set_ready();
    spikes.set_ready();
    drop(rx);

    // Simulated readings with a few jumps in them.
    for i in 0..200i64 {
        let reading = if i % 37 == 0 { i * 3 } else { i % 40 };
        tx.send(reading);
    }
    drop(tx);

    // Both branches report through their close hooks once the feed drains.
    while !(stats_done.load(Ordering::SeqCst) && spikes_done.load(Ordering::SeqCst)) {
        std::thread::sleep(Duration::from_millis(5));
    }

    drop(stats);
    drop(spikes);
    if let Err(err) = pool.shutdown() {
        eprintln!("Pool shutdown failed: {err}");
    }

    println!("\nPipeline complete!");
}
