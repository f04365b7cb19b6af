//! The shared per-stage engine: one [`Node`] per pipeline stage, holding the
//! user process, its input queue, and the concurrency state machine that
//! serializes steps, propagates close, and enforces the continue-to-send
//! (CTS) backpressure window.
//!
//! Nodes are only ever reached through the two capability surfaces:
//! [`SenderSurface`] (enqueue values, track upstream senders) and
//! [`ReceiverSurface`] (attach downstream senders, track observers, accept
//! CTS acks). The public [`Sender`]/[`Receiver`](crate::Receiver) handles
//! wrap these as trait objects.

use crate::channel::Sender;
use crate::metrics::{MetricsSnapshot, NodeMetrics};
use crate::process::{Process, ProcessState};
use crate::scheduler::Scheduler;
use parking_lot::Mutex;
use std::any::TypeId;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::mem;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Capability surface for feeding a node
pub(crate) trait SenderSurface<T>: Send + Sync {
    fn send(&self, value: T);
    fn add_sender(&self);
    fn remove_sender(&self);
}

/// Capability surface for observing and composing on a node
pub(crate) trait ReceiverSurface<T>: Send + Sync {
    fn map(&self, downstream: Sender<T>);
    fn cts(&self);
    fn add_receiver(&self);
    fn remove_receiver(&self);
    fn scheduler(&self) -> Arc<dyn Scheduler>;
    fn metrics(&self) -> MetricsSnapshot;
}

/// Compile-time strategy selecting the step variant for a node.
///
/// A kernel either drives a full [`Process`] through the await/yield
/// protocol (`YIELDS = true`) or applies a plain transform once per message
/// (`YIELDS = false`). The flag is an associated const so the branch in
/// [`Node::step`] folds away.
pub(crate) trait Kernel: Send + 'static {
    type Input: Send + 'static;
    type Output: Clone + Send + 'static;

    const YIELDS: bool;

    fn state(&self) -> ProcessState;
    fn absorb(&mut self, value: Self::Input);
    fn emit(&mut self) -> Self::Output;
    fn apply(&mut self, value: Self::Input) -> Self::Output;
    fn close(&mut self);
}

/// Kernel over a stateful yielding [`Process`]
pub(crate) struct ProcessKernel<P>(pub(crate) P);

impl<P: Process> Kernel for ProcessKernel<P> {
    type Input = P::Input;
    type Output = P::Output;

    const YIELDS: bool = true;

    fn state(&self) -> ProcessState {
        self.0.state()
    }

    fn absorb(&mut self, value: P::Input) {
        self.0.await_value(value);
    }

    fn emit(&mut self) -> P::Output {
        self.0.yield_value()
    }

    fn apply(&mut self, _value: P::Input) -> P::Output {
        unreachable!("transform step on a yielding process")
    }

    fn close(&mut self) {
        self.0.close();
    }
}

/// Kernel over a plain `FnMut` transform
pub(crate) struct TransformKernel<F, T, U> {
    f: F,
    _marker: PhantomData<fn(T) -> U>,
}

impl<F, T, U> TransformKernel<F, T, U> {
    pub(crate) fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<F, T, U> Kernel for TransformKernel<F, T, U>
where
    F: FnMut(T) -> U + Send + 'static,
    T: Send + 'static,
    U: Clone + Send + 'static,
{
    type Input = T;
    type Output = U;

    const YIELDS: bool = false;

    fn state(&self) -> ProcessState {
        ProcessState::Await
    }

    fn absorb(&mut self, _value: T) {
        unreachable!("await on a plain transform")
    }

    fn emit(&mut self) -> U {
        unreachable!("yield on a plain transform")
    }

    fn apply(&mut self, value: T) -> U {
        (self.f)(value)
    }

    fn close(&mut self) {}
}

/// Everything guarded by the process mutex
struct NodeState<T> {
    queue: VecDeque<T>,
    /// A step is in flight or imminent; schedules happen only on the
    /// false-to-true transition
    running: bool,
    /// Outstanding CTS acks awaited from the most recent broadcast
    suspend_count: usize,
    /// All upstream senders have dropped; drain the queue, then close
    close_queue: bool,
    /// The process has been closed; the next idle transition tears down
    /// the downstream links
    finished: bool,
}

impl<T> NodeState<T> {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            running: false,
            suspend_count: 0,
            close_queue: false,
            finished: false,
        }
    }
}

fn next_node_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// A single pipeline stage.
///
/// Owned by the receiver handle of this stage (and, transitively, by the
/// receivers of stages piped after it, since every node holds a strong
/// reference to its upstream). Upstream nodes reach this node only through
/// weak [`Sender`] handles, and scheduler tasks carry a weak reference that
/// is upgraded on entry, so neither extends the node's lifetime.
pub(crate) struct Node<K: Kernel> {
    this: Weak<Node<K>>,
    kernel: Mutex<K>,
    downstream: Mutex<Vec<Sender<K::Output>>>,
    state: Mutex<NodeState<K::Input>>,
    sender_count: AtomicUsize,
    receiver_count: AtomicUsize,
    /// False for `()`-valued nodes: nothing can observe them, so they run
    /// as soon as work arrives and the receiver count stays at zero
    observable: bool,
    upstream: Option<Arc<dyn ReceiverSurface<K::Input>>>,
    scheduler: Arc<dyn Scheduler>,
    metrics: NodeMetrics,
    id: u64,
}

impl<K: Kernel> Node<K> {
    pub(crate) fn new(
        kernel: K,
        upstream: Option<Arc<dyn ReceiverSurface<K::Input>>>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Arc<Self> {
        let observable = TypeId::of::<K::Output>() != TypeId::of::<()>();
        Arc::new_cyclic(|this| Node {
            this: this.clone(),
            kernel: Mutex::new(kernel),
            downstream: Mutex::new(Vec::new()),
            state: Mutex::new(NodeState::new()),
            sender_count: AtomicUsize::new(1),
            receiver_count: AtomicUsize::new(observable as usize),
            observable,
            upstream,
            scheduler,
            metrics: NodeMetrics::new(),
            id: next_node_id(),
        })
    }

    /// Hand one step to the scheduler. The task holds only a weak
    /// reference; if the node is gone by the time it runs, it is a no-op.
    fn run(&self) {
        let node = self.this.clone();
        self.scheduler.submit(Box::new(move || {
            if let Some(node) = node.upgrade() {
                node.step();
            }
        }));
    }

    fn step(&self) {
        self.metrics.record_step();
        if K::YIELDS {
            self.step_yielding();
        } else {
            self.step_transform();
        }
    }

    /// Step variant for yielding processes: feed queued inputs to the
    /// process until it reports `Yield`, then broadcast one output.
    fn step_yielding(&self) {
        while self.kernel.lock().state() != ProcessState::Yield {
            if !self.dequeue() {
                break;
            }
        }
        if self.kernel.lock().state() == ProcessState::Await {
            self.task_done();
        } else {
            let value = self.kernel.lock().emit();
            self.broadcast(value);
            // Release the broadcaster's own slot in the suspend count.
            self.cts();
        }
    }

    /// Step variant for plain transforms: one message in, one broadcast out.
    fn step_transform(&self) {
        let mut message = None;
        let mut ack_upstream = false;
        let mut do_close = false;
        {
            let mut state = self.state.lock();
            match state.queue.pop_front() {
                Some(m) => {
                    ack_upstream = state.queue.is_empty();
                    message = Some(m);
                }
                None => {
                    do_close = mem::take(&mut state.close_queue);
                    state.finished = do_close;
                }
            }
        }
        if ack_upstream {
            if let Some(upstream) = &self.upstream {
                upstream.cts();
            }
        }
        match message {
            Some(m) => {
                self.metrics.record_processed();
                let value = self.kernel.lock().apply(m);
                self.broadcast(value);
                self.cts();
            }
            None => self.task_done(),
        }
    }

    /// Pop one message into the process, or handle close on an empty queue.
    /// Returns false when the step should stop draining.
    fn dequeue(&self) -> bool {
        let mut message = None;
        let mut ack_upstream = false;
        let mut do_close = false;
        {
            let mut state = self.state.lock();
            match state.queue.pop_front() {
                Some(m) => {
                    ack_upstream = state.queue.is_empty();
                    message = Some(m);
                }
                None => {
                    do_close = mem::take(&mut state.close_queue);
                    state.finished = do_close;
                }
            }
        }
        if ack_upstream {
            if let Some(upstream) = &self.upstream {
                upstream.cts();
            }
        }
        match message {
            Some(m) => {
                self.metrics.record_processed();
                self.kernel.lock().absorb(m);
                true
            }
            None => {
                if do_close {
                    tracing::debug!(node = self.id, "queue drained, closing process");
                    self.kernel.lock().close();
                }
                false
            }
        }
    }

    /// Deliver one value to every downstream sender present at snapshot
    /// time and enter the suspended phase. Senders attached mid-broadcast
    /// are picked up on the next one. The caller must follow up with a
    /// `cts` to release the broadcaster's own slot.
    fn broadcast(&self, value: K::Output) {
        let targets: Vec<Sender<K::Output>> = self.downstream.lock().clone();
        {
            let mut state = self.state.lock();
            assert_eq!(state.suspend_count, 0, "broadcast while suspended");
            state.suspend_count = targets.len() + 1;
        }
        self.metrics.record_broadcast();
        for target in &targets {
            target.send(value.clone());
        }
    }

    /// The step found no more work: either park the node or, if the queue
    /// refilled in the meantime, go straight into another step. When the
    /// close has been absorbed, drop the downstream senders, which
    /// propagates it.
    fn task_done(&self) {
        let (do_run, do_final) = {
            let mut state = self.state.lock();
            let do_run = !state.queue.is_empty() || state.close_queue;
            state.running = do_run;
            (do_run, state.finished)
        };
        assert!(!(do_run && do_final), "node cannot resume and finish at once");
        if do_run {
            self.run();
        }
        if do_final {
            tracing::debug!(node = self.id, "node finished, releasing downstream");
            self.downstream.lock().clear();
        }
    }
}

impl<K: Kernel> SenderSurface<K::Input> for Node<K> {
    fn send(&self, value: K::Input) {
        self.metrics.record_enqueued();
        let do_run = {
            let mut state = self.state.lock();
            state.queue.push_back(value);
            let run = self.receiver_count.load(Ordering::Acquire) == 0 && !state.running;
            state.running = state.running || run;
            run
        };
        if do_run {
            self.run();
        }
    }

    fn add_sender(&self) {
        self.sender_count.fetch_add(1, Ordering::AcqRel);
    }

    fn remove_sender(&self) {
        if self.sender_count.fetch_sub(1, Ordering::AcqRel) == 1 {
            let do_run = {
                let mut state = self.state.lock();
                state.close_queue = true;
                let run = self.receiver_count.load(Ordering::Acquire) == 0 && !state.running;
                state.running = state.running || run;
                run
            };
            if do_run {
                self.run();
            }
        }
    }
}

impl<K: Kernel> ReceiverSurface<K::Output> for Node<K> {
    fn map(&self, downstream: Sender<K::Output>) {
        self.downstream.lock().push(downstream);
    }

    fn cts(&self) {
        let mut do_run = false;
        let mut do_final = false;
        {
            let mut state = self.state.lock();
            assert!(state.running, "continue-to-send on an idle node");
            assert!(
                state.suspend_count > 0,
                "continue-to-send without a pending broadcast"
            );
            state.suspend_count -= 1;
            if state.suspend_count == 0 {
                // The process state is read under the lock; Process::state
                // is documented to be cheap and reentrancy-free.
                if self.kernel.lock().state() == ProcessState::Yield
                    || !state.queue.is_empty()
                    || state.close_queue
                {
                    do_run = true;
                } else {
                    state.running = false;
                    do_final = state.finished;
                }
            }
        }
        if do_run {
            self.run();
        } else if do_final {
            // A close-time flush ends here rather than in task_done; the
            // downstream senders still have to be released.
            tracing::debug!(node = self.id, "node finished after flush, releasing downstream");
            self.downstream.lock().clear();
        }
    }

    fn add_receiver(&self) {
        if self.observable {
            self.receiver_count.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn remove_receiver(&self) {
        if !self.observable {
            return;
        }
        // A send can slip in and start the node between the decrement and
        // the check below, so `running` is re-tested under the lock.
        if self.receiver_count.fetch_sub(1, Ordering::AcqRel) == 1 {
            let do_run = {
                let mut state = self.state.lock();
                let run = (!state.queue.is_empty() || state.close_queue) && !state.running;
                state.running = state.running || run;
                run
            };
            if do_run {
                self.run();
            }
        }
    }

    fn scheduler(&self) -> Arc<dyn Scheduler> {
        Arc::clone(&self.scheduler)
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
