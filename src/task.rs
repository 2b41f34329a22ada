//! Cancelable background tasks.
//!
//! Every long-running operation (scan, duplicate detection, batch analysis)
//! runs as a [`BackgroundTask`]: a dedicated thread plus an event channel.
//! The work closure receives a [`TaskContext`] through which it polls the
//! cancellation flag at safe checkpoints and emits bounded-cadence progress.
//! The handle's channel delivers zero or more `Progress` events followed by
//! exactly one `Completed` event, on normal completion and after
//! cancellation alike.
//!
//! Cancellation is cooperative: [`TaskHandle::cancel`] only sets a flag and
//! returns immediately; the running work unwinds at its next checkpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;

use crate::progress::ProgressCallback;

/// Events emitted by a background task.
#[derive(Debug)]
pub enum TaskEvent<T> {
    /// Work advanced to `current` of `total`.
    Progress {
        /// Items processed so far
        current: usize,
        /// Total items, constant once known
        total: usize,
    },
    /// The task finished and this is its payload. Sent exactly once.
    Completed(T),
}

/// Handed to the work closure: cancellation polling and progress emission.
pub struct TaskContext<T> {
    cancel: Arc<AtomicBool>,
    tx: Arc<Mutex<Sender<TaskEvent<T>>>>,
}

impl<T> Clone for TaskContext<T> {
    fn clone(&self) -> Self {
        Self {
            cancel: Arc::clone(&self.cancel),
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> TaskContext<T> {
    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// The shared cancellation flag, for wiring into component configs.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Emit a progress event. Send failures (receiver dropped) are ignored.
    pub fn progress(&self, current: usize, total: usize) {
        let _ = self
            .tx
            .lock()
            .unwrap()
            .send(TaskEvent::Progress { current, total });
    }

    fn complete(&self, payload: T) {
        let _ = self.tx.lock().unwrap().send(TaskEvent::Completed(payload));
    }
}

impl<T: Send + 'static> ProgressCallback for TaskContext<T> {
    fn on_progress(&self, current: usize, total: usize) {
        self.progress(current, total);
    }
}

/// A running (or finished) background task.
///
/// Dropping the handle detaches the thread; the work keeps running but its
/// events go nowhere. Use [`wait`](Self::wait) to block for the payload.
pub struct BackgroundTask<T> {
    name: String,
    cancel: Arc<AtomicBool>,
    events: Receiver<TaskEvent<T>>,
    join: Option<JoinHandle<()>>,
}

/// Alias kept close to how call sites read: `TaskHandle<ScanOutcome>`.
pub type TaskHandle<T> = BackgroundTask<T>;

impl<T: Send + 'static> BackgroundTask<T> {
    /// Spawn `work` on a new thread and return its handle.
    pub fn spawn<F>(name: impl Into<String>, work: F) -> Self
    where
        F: FnOnce(&TaskContext<T>) -> T + Send + 'static,
    {
        let name = name.into();
        let (tx, events) = mpsc::channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let ctx = TaskContext {
            cancel: Arc::clone(&cancel),
            tx: Arc::new(Mutex::new(tx)),
        };

        log::debug!("Starting background task: {}", name);
        let join = std::thread::spawn(move || {
            let payload = work(&ctx);
            ctx.complete(payload);
        });

        Self {
            name,
            cancel,
            events,
            join: Some(join),
        }
    }

    /// Name given at spawn time.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request cooperative cancellation. Non-blocking, best-effort.
    pub fn cancel(&self) {
        log::debug!("Cancellation requested for task: {}", self.name);
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// The event channel: progress events, then one completion.
    #[must_use]
    pub fn events(&self) -> &Receiver<TaskEvent<T>> {
        &self.events
    }

    /// Block until the task completes and return its payload.
    ///
    /// Returns `None` only if the worker died without completing (a panic
    /// in the work closure).
    #[must_use]
    pub fn wait(mut self) -> Option<T> {
        let mut payload = None;
        for event in self.events.iter() {
            if let TaskEvent::Completed(value) = event {
                payload = Some(value);
                break;
            }
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
        payload
    }
}

/// Build a bounded worker pool for I/O-heavy per-file fan-out.
///
/// With `threads` = 0 the pool is sized `min(cores, 4)`; more threads than
/// that just thrash the disk.
#[must_use]
pub fn io_pool(threads: usize) -> rayon::ThreadPool {
    let threads = if threads == 0 {
        std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1)
            .min(4)
    } else {
        threads
    };
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .unwrap_or_else(|_| {
            log::warn!(
                "Failed to create worker pool, falling back to {} threads",
                rayon::current_num_threads()
            );
            rayon::ThreadPoolBuilder::new().build().unwrap()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_completion_event_delivered_once() {
        let task = BackgroundTask::spawn("noop", |_ctx| 42usize);

        let mut completions = 0;
        for event in task.events().iter() {
            if let TaskEvent::Completed(value) = event {
                assert_eq!(value, 42);
                completions += 1;
            }
        }
        assert_eq!(completions, 1);
    }

    #[test]
    fn test_progress_events_monotonic() {
        let task = BackgroundTask::spawn("steps", |ctx| {
            for i in 1..=5 {
                ctx.progress(i, 5);
            }
            "done"
        });

        let mut last = 0;
        for event in task.events().iter() {
            match event {
                TaskEvent::Progress { current, total } => {
                    assert!(current >= last);
                    assert_eq!(total, 5);
                    last = current;
                }
                TaskEvent::Completed(value) => {
                    assert_eq!(value, "done");
                    break;
                }
            }
        }
        assert_eq!(last, 5);
    }

    #[test]
    fn test_cancel_still_completes() {
        let task = BackgroundTask::spawn("loop", |ctx| {
            let mut iterations = 0usize;
            while !ctx.is_cancelled() {
                iterations += 1;
                std::thread::sleep(Duration::from_millis(1));
                if iterations > 10_000 {
                    break;
                }
            }
            iterations
        });

        std::thread::sleep(Duration::from_millis(20));
        task.cancel();

        let iterations = task.wait().unwrap();
        assert!(iterations <= 10_000);
    }

    #[test]
    fn test_wait_returns_payload() {
        let task = BackgroundTask::spawn("value", |_ctx| vec![1, 2, 3]);
        assert_eq!(task.wait(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_io_pool_bounded() {
        let pool = io_pool(0);
        assert!(pool.current_num_threads() <= 4);

        let pool = io_pool(2);
        assert_eq!(pool.current_num_threads(), 2);
    }
}
