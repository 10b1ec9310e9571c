use super::{Deferred, Downstream, Propagation, Stage};
use crate::dispatcher::{Dispatcher, OnError};
use crate::error::{Error, Result};
use crate::event::Event;
use crate::timer::Timer;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::AbortHandle;

#[derive(Clone)]
pub struct DebounceOptions {
    delay: Duration,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    on_error: Option<OnError>,
    timer: Option<Timer>,
}

impl DebounceOptions {
    /// # Panics
    /// Panics if `delay` is zero.
    pub fn new(delay: Duration) -> Self {
        assert!(!delay.is_zero(), "debounce delay must be non-zero");
        Self {
            delay,
            dispatcher: None,
            on_error: None,
            timer: None,
        }
    }

    /// Emit through `dispatcher` instead of on the timer task.
    pub fn dispatcher(mut self, dispatcher: impl Dispatcher) -> Self {
        self.dispatcher = Some(Arc::new(dispatcher));
        self
    }

    pub fn on_error(mut self, f: impl Fn(Error) + Send + Sync + 'static) -> Self {
        self.on_error = Some(OnError::new(f));
        self
    }

    pub fn timer(mut self, timer: Timer) -> Self {
        self.timer = Some(timer);
        self
    }
}

impl fmt::Debug for DebounceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebounceOptions")
            .field("delay", &self.delay)
            .field("dispatcher", &self.dispatcher.is_some())
            .finish_non_exhaustive()
    }
}

struct Quiet<T> {
    /// Bumped on every event; a timer only fires for the generation it was
    /// started with.
    generation: u64,
    payload: Option<T>,
    timer: Option<AbortHandle>,
    disposed: bool,
}

struct Shared<T> {
    quiet: Mutex<Quiet<T>>,
    delay: Duration,
    deferred: Deferred,
    timer: Timer,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Quiet<T>> {
        self.quiet.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Trailing-edge coalescing: only an event followed by a full quiet period is
/// emitted.
pub(crate) struct Debounce<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Event> Debounce<T> {
    pub(crate) fn new(options: DebounceOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                quiet: Mutex::new(Quiet {
                    generation: 0,
                    payload: None,
                    timer: None,
                    disposed: false,
                }),
                delay: options.delay,
                deferred: Deferred::new(options.dispatcher, options.on_error),
                timer: options.timer.unwrap_or_else(Timer::current),
            }),
        }
    }
}

impl<T: Event> Stage<T> for Debounce<T> {
    fn on_next(&self, payload: &T, downstream: &Downstream<T>) -> Result<Propagation> {
        let mut quiet = self.shared.lock();
        if quiet.disposed {
            return Ok(Propagation::Stop);
        }

        quiet.generation = quiet.generation.wrapping_add(1);
        quiet.payload = Some(payload.clone());
        if let Some(previous) = quiet.timer.take() {
            previous.abort();
            tracing::trace!("debounce restarted");
        }

        let generation = quiet.generation;
        let shared = self.shared.clone();
        let downstream = downstream.clone();
        quiet.timer = Some(
            self.shared
                .timer
                .after(self.shared.delay, fire(shared, downstream, generation)),
        );
        Ok(Propagation::Stop)
    }

    fn on_dispose(&self) {
        let mut quiet = self.shared.lock();
        quiet.disposed = true;
        quiet.payload = None;
        if let Some(timer) = quiet.timer.take() {
            timer.abort();
        }
    }
}

async fn fire<T: Event>(shared: Arc<Shared<T>>, downstream: Downstream<T>, generation: u64) {
    let payload = {
        let mut quiet = shared.lock();
        if quiet.disposed || quiet.generation != generation {
            return;
        }
        quiet.timer = None;
        match quiet.payload.take() {
            Some(payload) => payload,
            None => return,
        }
    };
    shared.deferred.deliver(&downstream, payload).await;
}
