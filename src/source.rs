use crate::error::Result;
use crate::event::Event;
use crate::lifecycle::{Dispose, Lifecycle};
use crate::mode::{Awaited, Direct, Mode};
use crate::node::Node;
use crate::signal::{Signal, Subscription};
use std::fmt;
use std::sync::Arc;

/// Anything a node can subscribe to: a source or another node.
pub trait Upstream<T: Event, M: Mode>: Dispose + Clone + Send + Sync + 'static {
    fn subscribe(&self, continuation: M::Continuation<T>) -> Subscription;

    fn unsubscribe(&self, subscription: Subscription) -> bool;
}

/// Synchronous publish point.
pub type Subject<T> = Source<T, Direct>;

/// Asynchronous publish point.
pub type AsyncSubject<T> = Source<T, Awaited>;

struct SourceInner<T: Event, M: Mode> {
    lifecycle: Lifecycle,
    subscribers: Signal<M::Continuation<T>>,
}

impl<T: Event, M: Mode> SourceInner<T, M> {
    fn dispose(&self) {
        self.lifecycle.dispose_with(|| {
            self.subscribers.clear();
            tracing::debug!("source disposed");
        });
    }
}

impl<T: Event, M: Mode> Drop for SourceInner<T, M> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Publish/subscribe primitive feeding chain roots.
///
/// Emitting runs every current subscriber in subscription order and stops at
/// the first failure, which is returned to the emitter.
pub struct Source<T: Event, M: Mode = Direct> {
    inner: Arc<SourceInner<T, M>>,
}

impl<T: Event, M: Mode> Source<T, M> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SourceInner {
                lifecycle: Lifecycle::new(),
                subscribers: Signal::new(),
            }),
        }
    }

    /// Starts a chain rooted at this source.
    pub fn observe(&self) -> Node<T, M> {
        Node::observe(self)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }
}

impl<T: Event> Source<T, Direct> {
    pub fn emit(&self, payload: T) -> Result<()> {
        if self.inner.lifecycle.is_disposed() {
            return Ok(());
        }
        for continuation in self.inner.subscribers.snapshot() {
            continuation(&payload)?;
        }
        Ok(())
    }
}

impl Source<(), Direct> {
    pub fn notify(&self) -> Result<()> {
        self.emit(())
    }
}

impl<T: Event> Source<T, Awaited> {
    pub async fn emit(&self, payload: T) -> Result<()> {
        if self.inner.lifecycle.is_disposed() {
            return Ok(());
        }
        for continuation in self.inner.subscribers.snapshot() {
            continuation(payload.clone()).await?;
        }
        Ok(())
    }
}

impl Source<(), Awaited> {
    pub async fn notify(&self) -> Result<()> {
        self.emit(()).await
    }
}

impl<T: Event, M: Mode> Upstream<T, M> for Source<T, M> {
    fn subscribe(&self, continuation: M::Continuation<T>) -> Subscription {
        self.inner.subscribers.subscribe(continuation)
    }

    fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.inner.subscribers.unsubscribe(subscription)
    }
}

impl<T: Event, M: Mode> Dispose for Source<T, M> {
    fn lifecycle(&self) -> &Lifecycle {
        &self.inner.lifecycle
    }

    fn dispose(&self) {
        self.inner.dispose();
    }
}

impl<T: Event, M: Mode> Default for Source<T, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Event, M: Mode> Clone for Source<T, M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Event, M: Mode> fmt::Debug for Source<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("disposed", &self.inner.lifecycle.is_disposed())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
