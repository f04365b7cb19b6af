//! Sender/receiver handles, the channel factory, and pipe composition.

use crate::metrics::MetricsSnapshot;
use crate::node::{Node, ProcessKernel, ReceiverSurface, SenderSurface, TransformKernel};
use crate::process::Process;
use crate::scheduler::{default_scheduler, Scheduler};
use std::ops::BitOr;
use std::sync::{Arc, Weak};

/// Create a pipeline root: an identity node with a feeding [`Sender`] and a
/// composable [`Receiver`], running on the process-wide default scheduler.
pub fn channel<T>() -> (Sender<T>, Receiver<T>)
where
    T: Clone + Send + 'static,
{
    channel_on(default_scheduler())
}

/// [`channel`], but stepping on the given scheduler. Stages piped after the
/// receiver inherit it, so one pipeline stays on one executor.
pub fn channel_on<T>(scheduler: Arc<dyn Scheduler>) -> (Sender<T>, Receiver<T>)
where
    T: Clone + Send + 'static,
{
    let node = Node::new(
        TransformKernel::new(std::convert::identity::<T>),
        None,
        scheduler,
    );
    let sender: Weak<dyn SenderSurface<T>> = Arc::downgrade(&(node.clone() as Arc<dyn SenderSurface<T>>));
    (Sender::new(sender), Receiver::new(node))
}

/// Handle granting enqueue capability on a pipeline node.
///
/// Senders hold only a weak reference: once every handle observing the
/// pipeline's output is gone, the nodes tear down and any further `send`
/// becomes a silent no-op. Dropping the last sender of a node closes it,
/// which propagates downstream after the queue drains.
pub struct Sender<T> {
    surface: Option<Weak<dyn SenderSurface<T>>>,
}

impl<T> Sender<T> {
    pub(crate) fn new(surface: Weak<dyn SenderSurface<T>>) -> Self {
        Self {
            surface: Some(surface),
        }
    }

    /// Enqueue a value. Never blocks; the queue is unbounded. Sending on a
    /// finished pipeline is a silent no-op.
    pub fn send(&self, value: T) {
        if let Some(surface) = self.surface.as_ref().and_then(Weak::upgrade) {
            surface.send(value);
        }
    }

    /// Give up the sending capability without waiting for the handle to
    /// drop. The handle is inert afterwards.
    pub fn close(&mut self) {
        if let Some(surface) = self.surface.take().and_then(|weak| weak.upgrade()) {
            surface.remove_sender();
        }
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        if let Some(surface) = self.surface.as_ref().and_then(Weak::upgrade) {
            surface.add_sender();
        }
        Self {
            surface: self.surface.clone(),
        }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        if let Some(surface) = self.surface.take().and_then(|weak| weak.upgrade()) {
            surface.remove_sender();
        }
    }
}

/// Handle granting observation and composition capability on a pipeline
/// node.
///
/// A fresh receiver holds the node back from running: the engine counts it
/// as an observer still wiring up the pipeline. Call [`set_ready`] (or pipe
/// the receiver onward by value, or drop it) to release that hold.
///
/// Receivers own their node, and nodes own their upstreams, so keeping the
/// terminal receiver of a chain alive keeps the whole chain alive.
///
/// [`set_ready`]: Receiver::set_ready
pub struct Receiver<T> {
    surface: Arc<dyn ReceiverSurface<T>>,
    ready: bool,
}

impl<T> Receiver<T>
where
    T: Send + 'static,
{
    pub(crate) fn new(surface: Arc<dyn ReceiverSurface<T>>) -> Self {
        Self {
            surface,
            ready: false,
        }
    }

    /// Signal that no further composition will happen through this handle,
    /// arming the node to run. Idempotent.
    pub fn set_ready(&mut self) {
        if !self.ready {
            self.surface.remove_receiver();
            self.ready = true;
        }
    }

    /// Whether [`set_ready`](Receiver::set_ready) has been called
    pub fn ready(&self) -> bool {
        self.ready
    }

    /// Snapshot of this node's activity counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.surface.metrics()
    }

    /// Attach a transform stage fed by this node and return its receiver.
    ///
    /// Can be called repeatedly to fan the node's output out to several
    /// branches; every branch present at a broadcast receives the value.
    /// Branches attached later only see later broadcasts.
    pub fn pipe<F, U>(&self, f: F) -> Receiver<U>
    where
        F: FnMut(T) -> U + Send + 'static,
        U: Clone + Send + 'static,
    {
        let node = Node::new(
            TransformKernel::new(f),
            Some(Arc::clone(&self.surface)),
            self.surface.scheduler(),
        );
        let sender: Weak<dyn SenderSurface<T>> = Arc::downgrade(&(node.clone() as Arc<dyn SenderSurface<T>>));
        self.surface.map(Sender::new(sender));
        Receiver::new(node)
    }

    /// Attach a stateful yielding [`Process`] stage fed by this node and
    /// return its receiver.
    pub fn pipe_process<P>(&self, process: P) -> Receiver<P::Output>
    where
        P: Process<Input = T>,
    {
        let node = Node::new(
            ProcessKernel(process),
            Some(Arc::clone(&self.surface)),
            self.surface.scheduler(),
        );
        let sender: Weak<dyn SenderSurface<T>> = Arc::downgrade(&(node.clone() as Arc<dyn SenderSurface<T>>));
        self.surface.map(Sender::new(sender));
        Receiver::new(node)
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        // A copy of a not-yet-ready receiver is another observer still
        // wiring up; it takes its own hold on the node.
        if !self.ready {
            self.surface.add_receiver();
        }
        Self {
            surface: Arc::clone(&self.surface),
            ready: self.ready,
        }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        if !self.ready {
            self.surface.remove_receiver();
        }
    }
}

/// `receiver | f` — pipe by value; the receiver's hold on the node is
/// released as the chain moves on.
impl<T, F, U> BitOr<F> for Receiver<T>
where
    T: Send + 'static,
    F: FnMut(T) -> U + Send + 'static,
    U: Clone + Send + 'static,
{
    type Output = Receiver<U>;

    fn bitor(self, f: F) -> Receiver<U> {
        self.pipe(f)
    }
}

/// `&receiver | f` — pipe by reference, for fanning out
impl<T, F, U> BitOr<F> for &Receiver<T>
where
    T: Send + 'static,
    F: FnMut(T) -> U + Send + 'static,
    U: Clone + Send + 'static,
{
    type Output = Receiver<U>;

    fn bitor(self, f: F) -> Receiver<U> {
        self.pipe(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::InlineScheduler;
    use parking_lot::Mutex;

    #[test]
    fn test_pipe_operator_chains() {
        let scheduler = Arc::new(InlineScheduler);
        let (tx, rx) = channel_on::<i32>(scheduler);

        let out = Arc::new(Mutex::new(Vec::new()));
        let sink_out = Arc::clone(&out);
        let _tail = rx | (|x: i32| x + 1) | (move |x: i32| sink_out.lock().push(x));

        tx.send(1);
        tx.send(2);
        drop(tx);

        assert_eq!(*out.lock(), vec![2, 3]);
    }

    #[test]
    fn test_set_ready_is_idempotent() {
        let scheduler = Arc::new(InlineScheduler);
        let (tx, mut rx) = channel_on::<i32>(scheduler);

        assert!(!rx.ready());
        rx.set_ready();
        rx.set_ready();
        assert!(rx.ready());

        tx.send(1);
        assert_eq!(rx.metrics().processed, 1);
    }

    #[test]
    fn test_send_after_teardown_is_a_no_op() {
        let scheduler = Arc::new(InlineScheduler);
        let (tx, rx) = channel_on::<i32>(scheduler);
        drop(rx);

        // The node is gone; these must be silent.
        tx.send(7);
        let mut tx = tx;
        tx.close();
        tx.send(8);
    }
}
