use crossbeam_utils::CachePadded;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

type Listener = Box<dyn FnOnce() + Send + 'static>;

/// Key returned by [`Lifecycle::on_disposed`], used to withdraw a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerKey(u64);

#[derive(Default)]
struct Listeners {
    next_key: u64,
    closed: bool,
    entries: Vec<(u64, Listener)>,
}

/// One-time teardown state shared by every source and chain node.
///
/// The disposed flag flips `false -> true` exactly once. Whoever wins that
/// transition runs the teardown; every other caller returns immediately.
/// Listeners registered through [`on_disposed`](Lifecycle::on_disposed) run in
/// registration order after teardown, and the [`CancellationToken`] returned
/// by [`token`](Lifecycle::token) is cancelled at the same moment for async
/// waiters.
pub struct Lifecycle {
    disposed: CachePadded<AtomicBool>,
    listeners: Mutex<Listeners>,
    token: CancellationToken,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            disposed: CachePadded::new(AtomicBool::new(false)),
            listeners: Mutex::new(Listeners::default()),
            token: CancellationToken::new(),
        }
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Runs `teardown` and then notifies listeners, unless disposal already
    /// happened. Returns whether this call performed the transition.
    pub fn dispose_with(&self, teardown: impl FnOnce()) -> bool {
        if self
            .disposed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        teardown();

        let entries = {
            let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
            listeners.closed = true;
            std::mem::take(&mut listeners.entries)
        };
        self.token.cancel();
        for (_, listener) in entries {
            listener();
        }
        true
    }

    /// Registers `listener` to run once disposal completes.
    ///
    /// If disposal already completed the listener runs immediately on the
    /// calling thread and `None` is returned.
    pub fn on_disposed(&self, listener: impl FnOnce() + Send + 'static) -> Option<ListenerKey> {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        if listeners.closed {
            drop(listeners);
            listener();
            return None;
        }

        let key = listeners.next_key;
        listeners.next_key += 1;
        listeners.entries.push((key, Box::new(listener)));
        Some(ListenerKey(key))
    }

    /// Withdraws a listener that has not fired yet.
    pub fn remove(&self, key: ListenerKey) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.entries.len();
        listeners.entries.retain(|(k, _)| *k != key.0);
        listeners.entries.len() != before
    }

    /// Token cancelled when disposal completes.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Resolves once disposal completes.
    pub async fn disposed(&self) {
        self.token.cancelled().await
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

/// Anything with a one-time teardown.
pub trait Dispose {
    fn lifecycle(&self) -> &Lifecycle;

    /// Tears the object down. Safe to call repeatedly and from any thread.
    fn dispose(&self);

    #[inline]
    fn is_disposed(&self) -> bool {
        self.lifecycle().is_disposed()
    }
}

impl Dispose for Lifecycle {
    fn lifecycle(&self) -> &Lifecycle {
        self
    }

    fn dispose(&self) {
        self.dispose_with(|| {});
    }
}

impl<D: Dispose + ?Sized> Dispose for Arc<D> {
    fn lifecycle(&self) -> &Lifecycle {
        (**self).lifecycle()
    }

    fn dispose(&self) {
        (**self).dispose()
    }
}
