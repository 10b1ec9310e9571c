use crate::error::{Error, Result};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;

pub type Action = Box<dyn FnOnce() + Send + 'static>;

/// Execution context that continuations can be marshaled onto.
///
/// Implementations decide where and when the work runs; callers never observe
/// failures synchronously once work has been handed over.
pub trait Dispatcher: Send + Sync + 'static {
    fn run(&self, action: Action);

    fn run_async(&self, action: BoxFuture<'static, ()>);

    /// Runs `action` and reports an escaping failure to `on_error`.
    fn run_async_with(&self, action: BoxFuture<'static, Result<()>>, on_error: OnError) {
        self.run_async(
            async move {
                if let Err(error) = action.await {
                    on_error.report(error);
                }
            }
            .boxed(),
        );
    }
}

impl<D: Dispatcher + ?Sized> Dispatcher for Arc<D> {
    fn run(&self, action: Action) {
        (**self).run(action)
    }

    fn run_async(&self, action: BoxFuture<'static, ()>) {
        (**self).run_async(action)
    }

    fn run_async_with(&self, action: BoxFuture<'static, Result<()>>, on_error: OnError) {
        (**self).run_async_with(action, on_error)
    }
}

/// Receiver for failures that have no live caller to bubble to.
#[derive(Clone)]
pub struct OnError(Arc<dyn Fn(Error) + Send + Sync + 'static>);

impl OnError {
    pub fn new(f: impl Fn(Error) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Drops failures, leaving a debug trace.
    pub(crate) fn discard() -> Self {
        Self::new(|error| tracing::debug!(%error, "deferred failure dropped"))
    }

    #[inline]
    pub fn report(&self, error: Error) {
        (self.0)(error)
    }
}

impl fmt::Debug for OnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OnError")
    }
}

/// Runs work as tasks on a Tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioDispatcher {
    handle: Handle,
}

impl TokioDispatcher {
    /// Dispatcher bound to the runtime the caller is running on.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime.
    pub fn current() -> Self {
        Self {
            handle: Handle::current(),
        }
    }

    pub fn from_handle(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Dispatcher for TokioDispatcher {
    fn run(&self, action: Action) {
        self.handle.spawn(async move { action() });
    }

    fn run_async(&self, action: BoxFuture<'static, ()>) {
        self.handle.spawn(action);
    }
}

enum Job {
    Action(Action),
    Future(BoxFuture<'static, ()>),
}

/// Loop-style target: work is queued and only runs when the owner pumps it
/// with [`run_pending`](QueueDispatcher::run_pending).
#[derive(Clone, Default)]
pub struct QueueDispatcher {
    jobs: Arc<Mutex<VecDeque<Job>>>,
}

impl QueueDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Runs queued work in FIFO order, including work queued while draining.
    /// Returns how many jobs ran.
    pub async fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let job = self.jobs.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
            match job {
                Some(Job::Action(action)) => action(),
                Some(Job::Future(future)) => future.await,
                None => break ran,
            }
            ran += 1;
        }
    }

    fn push(&self, job: Job) {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(job);
    }
}

impl Dispatcher for QueueDispatcher {
    fn run(&self, action: Action) {
        self.push(Job::Action(action));
    }

    fn run_async(&self, action: BoxFuture<'static, ()>) {
        self.push(Job::Future(action));
    }
}

impl fmt::Debug for QueueDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueDispatcher")
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn queue_runs_nothing_until_pumped() {
        let queue = QueueDispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));

        let hits = count.clone();
        queue.run(Box::new(move || {
            hits.fetch_add(1, Ordering::SeqCst);
        }));
        let hits = count.clone();
        queue.run_async(
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
            }
            .boxed(),
        );

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(queue.pending(), 2);
        assert_eq!(queue.run_pending().await, 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn run_async_with_reports_failures() {
        let queue = QueueDispatcher::new();
        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = reported.clone();

        queue.run_async_with(
            async { Err(Error::msg("lost")) }.boxed(),
            OnError::new(move |error| sink.lock().unwrap().push(error.to_string())),
        );
        queue.run_pending().await;

        assert_eq!(*reported.lock().unwrap(), vec!["lost".to_string()]);
    }

    #[tokio::test]
    async fn tokio_dispatcher_spawns_on_the_runtime() {
        let dispatcher = TokioDispatcher::current();
        let (tx, rx) = tokio::sync::oneshot::channel();
        dispatcher.run(Box::new(move || {
            let _ = tx.send(42);
        }));
        assert_eq!(rx.await.unwrap(), 42);
    }
}
