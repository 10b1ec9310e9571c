use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

/// Timer facility used by time-based stages.
///
/// Timer callbacks run as tasks on the wrapped runtime and race with live
/// callers exactly like any other thread would.
#[derive(Debug, Clone)]
pub struct Timer {
    handle: Handle,
}

impl Timer {
    /// Timer on the runtime the caller is running on.
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

    pub(crate) fn spawn<F>(&self, future: F) -> AbortHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(future).abort_handle()
    }

    /// Runs `f` once `delay` elapsed, unless aborted first.
    pub(crate) fn after<F>(&self, delay: Duration, f: F) -> AbortHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn(async move {
            tokio::time::sleep(delay).await;
            f.await
        })
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::current()
    }
}
