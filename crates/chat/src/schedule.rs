//! Deferred re-invocation for the single-threaded view layer.
//!
//! Scheduled work is plain data handed back to its owner when due, so retries,
//! stabilization windows and delayed re-checks can be driven by a virtual clock.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// Cancellation handle for one scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(u64);

pub trait Scheduler<T> {
    /// Time elapsed since the scheduler was created.
    fn now(&self) -> Duration;

    fn schedule(&mut self, delay: Duration, task: T) -> TaskHandle;

    /// Cancelling a task that already fired or was already cancelled is a no-op.
    fn cancel(&mut self, handle: TaskHandle);
}

/// Virtual-clock scheduler; nothing fires until the owner advances time.
#[derive(Debug)]
pub struct ManualScheduler<T> {
    now: Duration,
    next_id: u64,
    pending: BTreeMap<(Duration, u64), T>,
    deadlines: HashMap<u64, Duration>,
}

impl<T> ManualScheduler<T> {
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            next_id: 0,
            pending: BTreeMap::new(),
            deadlines: HashMap::new(),
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Pops the earliest task due at or before `until`, moving the clock to its deadline.
    ///
    /// Ties fire in scheduling order.
    pub fn next_due(&mut self, until: Duration) -> Option<T> {
        let (&(deadline, id), _) = self.pending.first_key_value()?;
        if deadline > until {
            return None;
        }

        self.deadlines.remove(&id);
        self.now = self.now.max(deadline);
        self.pending.remove(&(deadline, id))
    }

    /// Advances the clock by `by` and returns every task that became due, in order.
    ///
    /// Tasks scheduled by the caller while handling the returned batch are not included.
    pub fn advance(&mut self, by: Duration) -> Vec<T> {
        let until = self.now + by;
        let mut due = Vec::new();
        while let Some(task) = self.next_due(until) {
            due.push(task);
        }
        self.now = until;
        due
    }
}

impl<T> Default for ManualScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> for ManualScheduler<T> {
    fn now(&self) -> Duration {
        self.now
    }

    fn schedule(&mut self, delay: Duration, task: T) -> TaskHandle {
        let id = self.next_id;
        self.next_id += 1;
        let deadline = self.now + delay;
        self.pending.insert((deadline, id), task);
        self.deadlines.insert(id, deadline);
        TaskHandle(id)
    }

    fn cancel(&mut self, handle: TaskHandle) {
        if let Some(deadline) = self.deadlines.remove(&handle.0) {
            self.pending.remove(&(deadline, handle.0));
        }
    }
}

/// Real-time scheduler backed by tokio timers.
///
/// Due tasks are delivered over the receiver returned by [`TokioScheduler::new`];
/// the UI loop drains it and dispatches each task. Must be used inside a tokio runtime.
#[derive(Debug)]
pub struct TokioScheduler<T> {
    sender: mpsc::UnboundedSender<T>,
    started: tokio::time::Instant,
    next_id: u64,
    timers: HashMap<u64, AbortHandle>,
}

impl<T: Send + 'static> TokioScheduler<T> {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<T>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let scheduler = Self {
            sender,
            started: tokio::time::Instant::now(),
            next_id: 0,
            timers: HashMap::new(),
        };
        (scheduler, receiver)
    }
}

impl<T: Send + 'static> Scheduler<T> for TokioScheduler<T> {
    fn now(&self) -> Duration {
        self.started.elapsed()
    }

    fn schedule(&mut self, delay: Duration, task: T) -> TaskHandle {
        let id = self.next_id;
        self.next_id += 1;

        let sender = self.sender.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The receiver is gone once the UI loop shut down.
            let _ = sender.send(task);
        });

        self.timers.retain(|_, handle| !handle.is_finished());
        self.timers.insert(id, timer.abort_handle());
        TaskHandle(id)
    }

    fn cancel(&mut self, handle: TaskHandle) {
        if let Some(timer) = self.timers.remove(&handle.0) {
            timer.abort();
        }
    }
}
