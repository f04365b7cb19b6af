//! Concurrent dataflow pipelines built from processes connected by typed channels.
//!
//! This crate assembles pipelines out of user-supplied processes: stateful
//! transformers that consume input values in order and emit output values
//! downstream. The library never owns a thread — whenever a stage has work,
//! it submits a small step task to an injected [`Scheduler`] — yet it
//! guarantees at most one concurrent step per stage, close propagation when
//! upstream senders drop, and hop-by-hop backpressure: after a broadcast, a
//! stage does not advance until every downstream branch has consumed the
//! value (the continue-to-send protocol).
//!
//! # Features
//!
//! - Typed channels with a pipe operator (`receiver | f`) for composition
//! - Stateful N:1 and 1:N stages via the await/yield [`Process`] protocol
//! - Fan-out broadcast to any number of downstream branches
//! - One-value-in-flight backpressure per edge, with unbounded stage queues
//! - Pluggable executors: a worker [`ThreadPool`], a synchronous
//!   [`InlineScheduler`], and a [`ManualScheduler`] for deterministic tests
//! - Per-stage activity counters
//!
//! # Example
//!
//! ```
//! use pipeflow::{channel_on, InlineScheduler};
//! use std::sync::{Arc, Mutex};
//!
//! let scheduler = Arc::new(InlineScheduler);
//! let (tx, rx) = channel_on::<i32>(scheduler);
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = {
//!     let seen = Arc::clone(&seen);
//!     rx.pipe(move |x: i32| seen.lock().unwrap().push(x * 2))
//! };
//! drop(rx); // composition done; let the root run
//!
//! tx.send(1);
//! tx.send(2);
//! drop(tx); // closes the pipeline
//!
//! assert_eq!(*seen.lock().unwrap(), vec![2, 4]);
//! drop(sink);
//! ```

pub mod channel;
pub mod error;
pub mod metrics;
pub mod process;
pub mod scheduler;

mod node;

// Re-exports for convenience
pub use channel::{channel, channel_on, Receiver, Sender};
pub use error::{PipelineError, Result};
pub use metrics::MetricsSnapshot;
pub use process::{FnProcess, Process, ProcessState};
pub use scheduler::{
    default_scheduler, InlineScheduler, ManualScheduler, Scheduler, Task, ThreadPool,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
