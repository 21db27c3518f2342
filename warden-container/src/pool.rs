//! Container-owned worker pool for asynchronous method calls.
//!
//! The pool wraps a multi-thread `tokio` runtime started on first use.
//! Every task is tracked by a [`TaskTracker`]. Shutdown is cooperative
//! first and forced second: the pool's [`CancellationToken`] is cancelled,
//! tracked tasks get a bounded grace period, and the runtime is torn down
//! with whatever is still running.
//!
//! ```
//! use std::time::Duration;
//! use warden_container::pool::WorkerPool;
//!
//! let pool = WorkerPool::new(2, "doc-worker");
//! let task = pool.spawn(async { 20 + 22 });
//! assert_eq!(task.wait(), Ok(42));
//!
//! let report = pool.shutdown(Duration::from_millis(100));
//! assert!(report.drained);
//! ```

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Time granted to the runtime itself to tear down after the grace period.
const TEARDOWN_GRACE: Duration = Duration::from_millis(100);

/// Why a task produced no result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("task was cancelled before completing")]
    Cancelled,
    #[error("task rejected: worker pool is shut down")]
    Rejected,
}

/// Outcome of [`WorkerPool::shutdown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Every task finished within the grace period.
    pub drained: bool,
    /// Tasks still running when the grace period ran out.
    pub cancelled: usize,
}

/// A lazily started worker pool.
pub struct WorkerPool {
    workers: usize,
    thread_name: String,
    runtime: Mutex<Option<Runtime>>,
    tracker: TaskTracker,
    cancel_token: CancellationToken,
}

impl WorkerPool {
    pub fn new(workers: usize, thread_name: impl Into<String>) -> Self {
        Self {
            workers: workers.max(1),
            thread_name: thread_name.into(),
            runtime: Mutex::new(None),
            tracker: TaskTracker::new(),
            cancel_token: CancellationToken::new(),
        }
    }

    /// Runs `future` on the pool. After shutdown the returned handle
    /// resolves to [`TaskError::Rejected`].
    pub fn spawn<T, F>(&self, future: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        let mut runtime = self.runtime.lock();
        if self.tracker.is_closed() {
            debug!("Rejected task: worker pool is shut down");
            return TaskHandle::rejected();
        }
        if runtime.is_none() {
            match self.start() {
                Ok(started) => *runtime = Some(started),
                Err(err) => {
                    warn!(%err, "Failed to start worker pool");
                    return TaskHandle::rejected();
                }
            }
        }
        let Some(rt) = runtime.as_ref() else {
            return TaskHandle::rejected();
        };

        let (tx, rx) = oneshot::channel();
        let tracked = self.tracker.track_future(async move {
            let _ = tx.send(future.await);
        });
        let join = rt.spawn(tracked);

        TaskHandle {
            result: Some(rx),
            abort: Some(join.abort_handle()),
        }
    }

    fn start(&self) -> std::io::Result<Runtime> {
        info!(workers = self.workers, name = %self.thread_name, "Starting worker pool");
        Builder::new_multi_thread()
            .worker_threads(self.workers)
            .thread_name(self.thread_name.clone())
            .enable_all()
            .build()
    }

    /// Child token cancelled when shutdown begins. Long-running tasks
    /// should watch it and return early.
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    pub fn is_shut_down(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Number of tasks that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stops the pool: cancel, close, wait up to `timeout`, then tear the
    /// runtime down with whatever is left. Calling it again is a no-op.
    ///
    /// Blocks the calling thread; must not be called from inside an
    /// asynchronous context.
    pub fn shutdown(&self, timeout: Duration) -> ShutdownReport {
        let runtime = {
            let mut runtime = self.runtime.lock();
            self.cancel_token.cancel();
            self.tracker.close();
            runtime.take()
        };
        let Some(runtime) = runtime else {
            return ShutdownReport {
                drained: true,
                cancelled: 0,
            };
        };

        info!(active = self.tracker.len(), ?timeout, "Shutting down worker pool");
        let tracker = self.tracker.clone();
        let drained = runtime.block_on(async move {
            tokio::select! {
                _ = tracker.wait() => true,
                _ = tokio::time::sleep(timeout) => false,
            }
        });
        let cancelled = if drained { 0 } else { self.tracker.len() };

        runtime.shutdown_timeout(TEARDOWN_GRACE);

        if drained {
            info!("Worker pool drained");
        } else {
            warn!(cancelled, ?timeout, "Worker pool did not drain in time, tasks cancelled");
        }
        ShutdownReport { drained, cancelled }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        self.tracker.close();
        if let Some(runtime) = self.runtime.get_mut().take() {
            debug!("Worker pool dropped without shutdown, stopping in background");
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .field("thread_name", &self.thread_name)
            .field("in_flight", &self.in_flight())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

/// Handle to a task spawned on a [`WorkerPool`].
///
/// Wait for it with [`wait`](Self::wait) from synchronous code or
/// `.await` it from asynchronous code.
#[derive(Debug)]
pub struct TaskHandle<T> {
    result: Option<oneshot::Receiver<T>>,
    abort: Option<AbortHandle>,
}

impl<T> TaskHandle<T> {
    fn rejected() -> Self {
        Self {
            result: None,
            abort: None,
        }
    }

    /// Blocks until the task completes.
    ///
    /// Must not be called from inside an asynchronous context.
    pub fn wait(self) -> Result<T, TaskError> {
        match self.result {
            Some(rx) => rx.blocking_recv().map_err(|_| TaskError::Cancelled),
            None => Err(TaskError::Rejected),
        }
    }

    /// Requests cancellation. Work already running on a worker thread
    /// finishes its current poll.
    pub fn cancel(&self) {
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.abort.as_ref().is_none_or(AbortHandle::is_finished)
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.get_mut().result.as_mut() {
            Some(rx) => Pin::new(rx).poll(cx).map(|r| r.map_err(|_| TaskError::Cancelled)),
            None => Poll::Ready(Err(TaskError::Rejected)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_off_the_calling_thread() {
        let pool = WorkerPool::new(1, "pool-test");
        let caller = std::thread::current().id();
        let worker = pool.spawn(async { std::thread::current().id() }).wait().unwrap();
        assert_ne!(caller, worker);
        pool.shutdown(Duration::from_millis(100));
    }

    #[test]
    fn cooperative_task_drains() {
        let pool = WorkerPool::new(1, "pool-test");
        let token = pool.child_token();
        let task = pool.spawn(async move {
            token.cancelled().await;
            "stopped"
        });

        let report = pool.shutdown(Duration::from_secs(2));
        assert_eq!(report, ShutdownReport { drained: true, cancelled: 0 });
        assert_eq!(task.wait(), Ok("stopped"));
    }

    #[test]
    fn stubborn_task_is_cancelled_within_bound() {
        let pool = WorkerPool::new(1, "pool-test");
        let task = pool.spawn(async {
            loop {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });
        while pool.in_flight() == 0 {
            std::thread::yield_now();
        }

        let started = std::time::Instant::now();
        let report = pool.shutdown(Duration::from_millis(100));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!report.drained);
        assert_eq!(report.cancelled, 1);
        assert_eq!(task.wait(), Err(TaskError::Cancelled));
    }

    #[test]
    fn spawn_after_shutdown_is_rejected() {
        let pool = WorkerPool::new(1, "pool-test");
        pool.shutdown(Duration::from_millis(10));
        assert!(pool.is_shut_down());
        assert_eq!(pool.spawn(async { 1 }).wait(), Err(TaskError::Rejected));
    }

    #[test]
    fn dropping_the_pool_from_a_worker_thread_is_safe() {
        let pool = std::sync::Arc::new(WorkerPool::new(1, "pool-test"));
        let owned = pool.clone();
        let task = pool.spawn(async move {
            std::thread::sleep(Duration::from_millis(50));
            drop(owned);
            7
        });
        drop(pool);
        assert_eq!(task.wait(), Ok(7));
    }

    #[test]
    fn cancel_before_completion() {
        let pool = WorkerPool::new(1, "pool-test");
        let task = pool.spawn(async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            1
        });
        task.cancel();
        assert_eq!(task.wait(), Err(TaskError::Cancelled));
        pool.shutdown(Duration::from_millis(100));
    }
}
