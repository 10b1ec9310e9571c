use super::{Link, Node};
use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::lifecycle::Dispose;
use crate::mode::{AsyncCallback, Awaited, Callback, Direct, Mode};
use crate::source::Upstream;
use crate::stage::{
    Catch, CatchAsync, Debounce, DebounceOptions, Dispatch, DispatchOptions, Filter, Inspect, Pass,
    Take, Throttle, ThrottleOptions, Until,
};
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

impl<T: Event, M: Mode> Node<T, M> {
    /// Drops events for which `predicate` returns false.
    pub fn filter(self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.pipe(Filter::new(predicate))
    }

    /// Observes every event without altering propagation.
    pub fn inspect(self, f: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.pipe(Inspect::new(f))
    }

    /// Lets at most one event through per `limit` window; the rest are dropped.
    ///
    /// # Panics
    /// Panics if `limit` is zero or when called outside a Tokio runtime.
    pub fn throttle(self, limit: Duration) -> Self {
        self.throttle_with(ThrottleOptions::new(limit))
    }

    /// Like [`throttle`](Node::throttle), but the most recent suppressed event
    /// is replayed when its window closes.
    ///
    /// # Panics
    /// Panics if `limit` is zero or when called outside a Tokio runtime.
    pub fn throttle_latest(self, limit: Duration) -> Self {
        self.throttle_with(ThrottleOptions::new(limit).latest(true))
    }

    /// # Panics
    /// Panics when called outside a Tokio runtime, unless `options` carries a
    /// [`Timer`](crate::Timer).
    pub fn throttle_with(self, options: ThrottleOptions) -> Self {
        self.pipe(Throttle::new(options))
    }

    /// Emits the last event of every burst once `delay` passed without a new
    /// one.
    ///
    /// # Panics
    /// Panics if `delay` is zero or when called outside a Tokio runtime.
    pub fn debounce(self, delay: Duration) -> Self {
        self.debounce_with(DebounceOptions::new(delay))
    }

    /// # Panics
    /// Panics when called outside a Tokio runtime, unless `options` carries a
    /// [`Timer`](crate::Timer).
    pub fn debounce_with(self, options: DebounceOptions) -> Self {
        self.pipe(Debounce::new(options))
    }

    /// Continues the chain on `dispatcher`. Failures below this point are
    /// dropped; use [`dispatch_with`](Node::dispatch_with) to observe them.
    pub fn dispatch(self, dispatcher: impl Dispatcher) -> Self {
        self.dispatch_with(DispatchOptions::new(dispatcher))
    }

    pub fn dispatch_with(self, options: DispatchOptions) -> Self {
        self.pipe(Dispatch::new(options))
    }

    /// Intercepts failures raised further down the chain. `handler` returns
    /// whether the failure was handled; unhandled failures are rethrown.
    pub fn catch(self, handler: impl Fn(&Error, &T) -> bool + Send + Sync + 'static) -> Self {
        self.pipe(Catch::new(handler))
    }

    /// Forwards events until one satisfies `predicate`; that event is still
    /// forwarded, then the chain is disposed.
    pub fn until(self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.pipe(Until::new(predicate))
    }

    /// Forwards `times` events, then disposes the chain.
    ///
    /// # Panics
    /// Panics if `times` is zero.
    pub fn take(self, times: usize) -> Self {
        self.pipe(Take::new(times))
    }

    /// Disposes the chain together with `other`. If `other` is already
    /// disposed the returned node is disposed immediately.
    pub fn until_disposed<D>(self, other: &D) -> Self
    where
        D: Dispose + Clone + Send + Sync + 'static,
    {
        let node = self.pipe(Pass);
        let weak = node.downgrade();
        let key = other.lifecycle().on_disposed(move || {
            if let Some(node) = weak.upgrade() {
                node.dispose();
            }
        });
        if let Some(key) = key {
            let other = other.clone();
            node.push_link(Link::new(move || {
                other.lifecycle().remove(key);
            }));
        }
        node
    }

    /// Disposes the chain once `token` is cancelled.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime with a live token.
    pub fn until_cancelled(self, token: CancellationToken) -> Self {
        let node = self.pipe(Pass);
        if token.is_cancelled() {
            node.dispose();
            return node;
        }

        let weak = node.downgrade();
        let own = node.lifecycle().token();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    if let Some(node) = weak.upgrade() {
                        node.dispose();
                    }
                }
                _ = own.cancelled() => {}
            }
        });
        node
    }
}

impl<T: Event> Node<T, Direct> {
    /// Terminal callback. A failure it returns propagates up the chain.
    pub fn on(self, f: impl Fn(&T) -> Result<()> + Send + Sync + 'static) -> Self {
        let node = self.pipe(Pass);
        let callback: Callback<T> = Arc::new(f);
        node.subscribe(callback);
        node
    }

    /// Terminal callback that disposes the chain after the first event.
    pub fn once(self, f: impl Fn(&T) -> Result<()> + Send + Sync + 'static) -> Self {
        self.take(1).on(f)
    }

    /// Terminal callback that disposes the chain after `times` events.
    pub fn many(self, times: usize, f: impl Fn(&T) -> Result<()> + Send + Sync + 'static) -> Self {
        self.take(times).on(f)
    }
}

impl<T: Event> Node<T, Awaited> {
    /// Terminal callback, awaited as part of the chain.
    pub fn on<F, Fut>(self, f: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let node = self.pipe(Pass);
        let callback: AsyncCallback<T> = Arc::new(move |payload| f(payload).boxed());
        node.subscribe(callback);
        node
    }

    pub fn once<F, Fut>(self, f: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.take(1).on(f)
    }

    pub fn many<F, Fut>(self, times: usize, f: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.take(times).on(f)
    }

    /// [`catch`](Node::catch) with an awaited handler.
    pub fn catch_async<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(Error, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.pipe(CatchAsync::new(handler))
    }
}
