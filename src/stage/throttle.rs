use super::{Deferred, Downstream, Propagation, Stage};
use crate::dispatcher::{Dispatcher, OnError};
use crate::error::{Error, Result};
use crate::event::Event;
use crate::timer::Timer;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;

#[derive(Clone)]
pub struct ThrottleOptions {
    limit: Duration,
    latest: bool,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    on_error: Option<OnError>,
    timer: Option<Timer>,
}

impl ThrottleOptions {
    /// # Panics
    /// Panics if `limit` is zero.
    pub fn new(limit: Duration) -> Self {
        assert!(!limit.is_zero(), "throttle limit must be non-zero");
        Self {
            limit,
            latest: false,
            dispatcher: None,
            on_error: None,
            timer: None,
        }
    }

    /// Replay the most recent suppressed event when a window closes.
    pub fn latest(mut self, latest: bool) -> Self {
        self.latest = latest;
        self
    }

    /// Run replays through `dispatcher` instead of on the timer task.
    pub fn dispatcher(mut self, dispatcher: impl Dispatcher) -> Self {
        self.dispatcher = Some(Arc::new(dispatcher));
        self
    }

    /// Receives failures raised by replays.
    pub fn on_error(mut self, f: impl Fn(Error) + Send + Sync + 'static) -> Self {
        self.on_error = Some(OnError::new(f));
        self
    }

    pub fn timer(mut self, timer: Timer) -> Self {
        self.timer = Some(timer);
        self
    }
}

impl fmt::Debug for ThrottleOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrottleOptions")
            .field("limit", &self.limit)
            .field("latest", &self.latest)
            .field("dispatcher", &self.dispatcher.is_some())
            .finish_non_exhaustive()
    }
}

/// Window state. "Is a window open" and "what is pending" only ever change
/// together under one lock.
struct Window<T> {
    open: bool,
    pending: Option<T>,
    closer: Option<AbortHandle>,
    disposed: bool,
}

struct Shared<T> {
    window: Mutex<Window<T>>,
    limit: Duration,
    latest: bool,
    deferred: Deferred,
    timer: Timer,
}

impl<T> Shared<T> {
    fn lock(&self) -> std::sync::MutexGuard<'_, Window<T>> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fixed-window rate limiter, optionally replaying the last suppressed event.
pub(crate) struct Throttle<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Event> Throttle<T> {
    pub(crate) fn new(options: ThrottleOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                window: Mutex::new(Window {
                    open: false,
                    pending: None,
                    closer: None,
                    disposed: false,
                }),
                limit: options.limit,
                latest: options.latest,
                deferred: Deferred::new(options.dispatcher, options.on_error),
                timer: options.timer.unwrap_or_else(Timer::current),
            }),
        }
    }
}

impl<T: Event> Stage<T> for Throttle<T> {
    fn on_next(&self, payload: &T, downstream: &Downstream<T>) -> Result<Propagation> {
        let mut window = self.shared.lock();
        if window.disposed {
            return Ok(Propagation::Stop);
        }
        if window.open {
            if self.shared.latest {
                window.pending = Some(payload.clone());
            }
            tracing::trace!(latest = self.shared.latest, "throttled");
            return Ok(Propagation::Stop);
        }

        window.open = true;
        let closer = self
            .shared
            .timer
            .spawn(close_windows(
                self.shared.clone(),
                downstream.clone(),
                deadline_after(self.shared.limit),
            ));
        window.closer = Some(closer);
        Ok(Propagation::Continue)
    }

    fn on_dispose(&self) {
        let mut window = self.shared.lock();
        window.disposed = true;
        window.open = false;
        window.pending = None;
        if let Some(closer) = window.closer.take() {
            closer.abort();
        }
    }
}

/// Far enough ahead to never fire, close enough to stay representable.
const NEVER: Duration = Duration::from_secs(86400 * 365 * 30);

/// End of a window opened now. Saturates instead of overflowing `Instant`.
fn deadline_after(limit: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(limit).unwrap_or_else(|| now + NEVER)
}

/// Closes the current window; each pending replay opens the next one.
async fn close_windows<T: Event>(
    shared: Arc<Shared<T>>,
    downstream: Downstream<T>,
    mut deadline: Instant,
) {
    loop {
        tokio::time::sleep_until(deadline).await;

        let replay = {
            let mut window = shared.lock();
            if window.disposed {
                return;
            }
            match window.pending.take() {
                Some(payload) => payload,
                None => {
                    window.open = false;
                    window.closer = None;
                    return;
                }
            }
        };

        deadline = deadline_after(shared.limit);
        tracing::trace!("replaying latest throttled event");
        shared.deferred.deliver(&downstream, replay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::QueueDispatcher;
    use crate::lifecycle::Dispose;
    use crate::source::Source;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    type Log = Arc<Mutex<Vec<(u32, u64)>>>;

    /// Records each payload together with the virtual time it arrived at.
    fn timeline(start: Instant) -> (Log, impl Fn(&u32) -> Result<()> + Send + Sync + 'static) {
        let log = Log::default();
        let sink = log.clone();
        (log, move |value: &u32| {
            let at = start.elapsed().as_millis() as u64;
            sink.lock().unwrap().push((*value, at));
            Ok(())
        })
    }

    async fn emit_at(source: &Source<u32>, start: Instant, times: &[u64]) {
        for &t in times {
            tokio::time::sleep_until(start + ms(t)).await;
            source.emit(t as u32).unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn passes_one_event_per_window() {
        let start = Instant::now();
        let source = Source::<u32>::new();
        let (log, callback) = timeline(start);
        let _chain = source.observe().throttle(ms(100)).on(callback);

        emit_at(&source, start, &[0, 10, 50, 150, 160]).await;
        tokio::time::sleep(ms(300)).await;

        assert_eq!(*log.lock().unwrap(), vec![(0, 0), (150, 150)]);
    }

    #[tokio::test(start_paused = true)]
    async fn latest_replays_the_last_suppressed_event() {
        let start = Instant::now();
        let source = Source::<u32>::new();
        let (log, callback) = timeline(start);
        let _chain = source.observe().throttle_latest(ms(100)).on(callback);

        emit_at(&source, start, &[0, 10, 50, 150, 160]).await;
        tokio::time::sleep(ms(400)).await;

        // 10 is overwritten by 50; the replay of 50 opens the window that
        // suppresses 150, which in turn is overwritten by 160.
        assert_eq!(*log.lock().unwrap(), vec![(0, 0), (50, 100), (160, 200)]);
    }

    #[tokio::test(start_paused = true)]
    async fn replay_runs_on_the_dispatcher() {
        let start = Instant::now();
        let source = Source::<u32>::new();
        let queue = QueueDispatcher::new();
        let (log, callback) = timeline(start);
        let _chain = source
            .observe()
            .throttle_with(ThrottleOptions::new(ms(100)).latest(true).dispatcher(queue.clone()))
            .on(callback);

        emit_at(&source, start, &[0, 20]).await;
        tokio::time::sleep_until(start + ms(150)).await;
        assert_eq!(log.lock().unwrap().len(), 1);
        assert_eq!(queue.pending(), 1);

        queue.run_pending().await;
        assert_eq!(*log.lock().unwrap(), vec![(0, 0), (20, 150)]);
    }

    #[tokio::test(start_paused = true)]
    async fn replay_failures_reach_the_error_callback() {
        let start = Instant::now();
        let source = Source::<u32>::new();
        let failures = Arc::new(AtomicUsize::new(0));
        let counter = failures.clone();
        let _chain = source
            .observe()
            .throttle_with(ThrottleOptions::new(ms(100)).latest(true).on_error(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .on(|value| if *value == 0 { Ok(()) } else { Err(Error::msg("rejected")) });

        emit_at(&source, start, &[0, 10]).await;
        tokio::time::sleep(ms(200)).await;

        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_drops_the_pending_replay() {
        let start = Instant::now();
        let source = Source::<u32>::new();
        let (log, callback) = timeline(start);
        let chain = source.observe().throttle_latest(ms(100)).on(callback);

        emit_at(&source, start, &[0, 10]).await;
        chain.dispose();
        tokio::time::sleep(ms(300)).await;
        source.emit(999).unwrap();

        assert_eq!(*log.lock().unwrap(), vec![(0, 0)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_callers_share_one_window() {
        let source = Source::<u32>::new();
        let passed = Arc::new(AtomicUsize::new(0));
        let counter = passed.clone();
        let chain = source.observe().throttle(Duration::from_secs(60)).on(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        std::thread::scope(|scope| {
            for thread in 0..8 {
                let source = source.clone();
                scope.spawn(move || {
                    for i in 0..200 {
                        source.emit(thread * 1000 + i).unwrap();
                    }
                });
            }
        });

        assert_eq!(passed.load(Ordering::SeqCst), 1);
        chain.dispose();
    }

    #[tokio::test]
    async fn unbounded_limit_suppresses_without_overflow() {
        let source = Source::<u32>::new();
        let passed = Arc::new(AtomicUsize::new(0));
        let counter = passed.clone();
        let chain = source
            .observe()
            .throttle_with(ThrottleOptions::new(Duration::MAX).latest(true))
            .on(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

        source.emit(1).unwrap();
        source.emit(2).unwrap();
        tokio::task::yield_now().await;

        assert_eq!(passed.load(Ordering::SeqCst), 1);
        chain.dispose();
    }

    fn delivered(seen: &Mutex<Vec<u32>>, value: u32) -> bool {
        seen.lock().unwrap().contains(&value)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn latest_replays_each_event_at_most_once_under_contention() {
        const THREADS: u32 = 4;
        const EVENTS: u32 = 2000;
        const FINAL: u32 = u32::MAX;

        let source = Source::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let chain = source.observe().throttle_latest(ms(1)).on(move |value| {
            sink.lock().unwrap().push(*value);
            Ok(())
        });

        let emitters: Vec<_> = (0..THREADS)
            .map(|thread| {
                let source = source.clone();
                tokio::task::spawn_blocking(move || {
                    for i in 0..EVENTS {
                        source.emit(thread * EVENTS + i).unwrap();
                        if i % 64 == 0 {
                            std::thread::sleep(Duration::from_micros(300));
                        }
                    }
                })
            })
            .collect();
        for emitter in emitters {
            emitter.await.unwrap();
        }

        // Arrives while a window may be closing; it must still come out last.
        source.emit(FINAL).unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while !delivered(&seen, FINAL) {
                tokio::time::sleep(ms(1)).await;
            }
        })
        .await
        .expect("final event was never replayed");
        tokio::time::sleep(ms(10)).await;

        let seen = seen.lock().unwrap().clone();
        let mut unique = seen.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), seen.len(), "an event was delivered twice");
        assert_eq!(seen.last(), Some(&FINAL));
        chain.dispose();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn no_replay_starts_after_dispose_returns() {
        let late = Arc::new(AtomicUsize::new(0));

        for round in 0..300u64 {
            let source = Source::<u32>::new();
            let disposed = Arc::new(AtomicBool::new(false));
            let flag = disposed.clone();
            let counter = late.clone();
            let chain = source.observe().throttle_latest(ms(1)).on(move |_| {
                if flag.load(Ordering::SeqCst) {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            });

            source.emit(0).unwrap();
            source.emit(1).unwrap();
            // Lands on either side of the window close.
            std::thread::sleep(Duration::from_micros(500 + (round % 20) * 50));
            chain.dispose();
            disposed.store(true, Ordering::SeqCst);
        }

        tokio::time::sleep(ms(20)).await;
        assert_eq!(late.load(Ordering::SeqCst), 0);
    }
}
