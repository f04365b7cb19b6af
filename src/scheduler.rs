use crate::error::{PipelineError, Result};
use crossbeam::channel::{unbounded, Sender as TaskSender};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};

/// A unit of work submitted by the engine
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Contract for the externally injected executor.
///
/// The engine never owns a thread; whenever a node has work it submits a
/// small step task here. Implementations must run each task to completion
/// on some thread, eventually, and must tolerate re-entrant submission (a
/// running task may submit further tasks). No ordering or fairness is
/// required.
pub trait Scheduler: Send + Sync + 'static {
    /// Submit a task for execution
    fn submit(&self, task: Task);
}

/// The default scheduler: a fixed set of worker threads fed from an
/// unbounded task queue.
pub struct ThreadPool {
    tasks: Mutex<Option<TaskSender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    /// Spawn a pool with one worker per available core
    pub fn new() -> Self {
        let threads = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self::with_threads(threads)
    }

    /// Spawn a pool with a fixed number of worker threads
    pub fn with_threads(threads: usize) -> Self {
        let (tx, rx) = unbounded::<Task>();
        let mut workers = Vec::with_capacity(threads);

        for _ in 0..threads {
            let rx = rx.clone();
            workers.push(thread::spawn(move || {
                for task in rx.iter() {
                    task();
                }
            }));
        }

        tracing::debug!(threads, "thread pool started");
        Self {
            tasks: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        }
    }

    /// Stop accepting tasks, finish the queued ones, and join the workers
    pub fn shutdown(&self) -> Result<()> {
        let Some(tx) = self.tasks.lock().take() else {
            return Err(PipelineError::SchedulerShutdown);
        };
        drop(tx);

        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in workers {
            handle.join().map_err(|payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic payload".to_string());
                PipelineError::WorkerPanicked(message)
            })?;
        }

        tracing::debug!("thread pool stopped");
        Ok(())
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ThreadPool {
    fn submit(&self, task: Task) {
        match self.tasks.lock().as_ref() {
            Some(tx) => {
                if tx.send(task).is_err() {
                    tracing::warn!("task dropped: worker queue disconnected");
                }
            }
            None => tracing::warn!("task dropped: scheduler already shut down"),
        }
    }
}

/// Process-wide pool backing [`channel`](crate::channel()), built on first use
pub fn default_scheduler() -> Arc<dyn Scheduler> {
    static DEFAULT: OnceLock<Arc<ThreadPool>> = OnceLock::new();
    let pool: Arc<ThreadPool> = Arc::clone(DEFAULT.get_or_init(|| Arc::new(ThreadPool::new())));
    pool
}

/// Runs every task synchronously on the submitting thread.
///
/// Turns the whole pipeline into ordinary nested function calls: a `send`
/// returns only once everything it triggered has run. Deterministic, which
/// makes it the scheduler of choice for tests and for single-threaded
/// embedding.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineScheduler;

impl Scheduler for InlineScheduler {
    fn submit(&self, task: Task) {
        task();
    }
}

/// Queues tasks until explicitly drained.
///
/// Lets a test stop the pipeline between any two steps and observe the
/// state in between, e.g. an upstream node suspended on its CTS window.
#[derive(Default)]
pub struct ManualScheduler {
    tasks: Mutex<VecDeque<Task>>,
}

impl ManualScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Run the oldest queued task. Returns false when the queue is empty.
    pub fn run_one(&self) -> bool {
        // Pop before running: the task may submit more tasks.
        let task = self.tasks.lock().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Drain the queue, including tasks enqueued while draining.
    /// Returns how many tasks ran.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_one() {
            ran += 1;
        }
        ran
    }

    /// Number of currently queued tasks
    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl Scheduler for ManualScheduler {
    fn submit(&self, task: Task) {
        self.tasks.lock().push_back(task);
    }
}
