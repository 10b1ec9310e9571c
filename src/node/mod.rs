mod ops;

use crate::error::Result;
use crate::event::Event;
use crate::lifecycle::{Dispose, Lifecycle};
use crate::mode::{Awaited, Direct, Mode};
use crate::signal::{Signal, Subscription};
use crate::source::Upstream;
use crate::stage::{Downstream, Pass, Propagation, Stage};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Synchronous chain node.
pub type Observer<T> = Node<T, Direct>;

/// Asynchronous chain node.
pub type AsyncObserver<T> = Node<T, Awaited>;

/// Detaches a node from one upstream when the node is torn down.
pub(crate) struct Link(Box<dyn FnOnce() + Send + 'static>);

impl Link {
    pub(crate) fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(detach))
    }

    fn run(self) {
        (self.0)()
    }
}

/// How a node relates to an upstream it subscribes to.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Tie {
    /// Disposing the node disposes the upstream too.
    pub(crate) owns: bool,
    /// Disposing the upstream disposes the node too.
    pub(crate) follows: bool,
}

impl Tie {
    pub(crate) const OWNED: Tie = Tie {
        owns: true,
        follows: true,
    };
    pub(crate) const BORROWED: Tie = Tie {
        owns: false,
        follows: true,
    };
    pub(crate) const MEMBER: Tie = Tie {
        owns: true,
        follows: false,
    };
    pub(crate) const DETACHED: Tie = Tie {
        owns: false,
        follows: false,
    };
}

pub struct NodeInner<T: Event, M: Mode> {
    lifecycle: Lifecycle,
    next: Signal<M::Continuation<T>>,
    stage: Box<dyn Stage<T>>,
    links: Mutex<Vec<Link>>,
    downstream: Downstream<T>,
}

impl<T: Event, M: Mode> NodeInner<T, M> {
    pub(crate) fn is_disposed(&self) -> bool {
        self.lifecycle.is_disposed()
    }

    /// Tears the node down: detach from upstreams, drop children, then let the
    /// stage release timers and buffers.
    pub(crate) fn dispose(&self) {
        self.lifecycle.dispose_with(|| {
            let links = std::mem::take(
                &mut *self.links.lock().unwrap_or_else(PoisonError::into_inner),
            );
            for link in links {
                link.run();
            }
            self.next.clear();
            self.stage.on_dispose();
            tracing::debug!(stage = self.stage.name(), "node disposed");
        });
    }

    /// Registers a link, or runs it straight away if the node is already gone.
    fn push_link(&self, link: Link) {
        let mut links = self.links.lock().unwrap_or_else(PoisonError::into_inner);
        if self.lifecycle.is_disposed() {
            drop(links);
            link.run();
        } else {
            links.push(link);
        }
    }
}

impl<T: Event> NodeInner<T, Direct> {
    pub(crate) fn raise(&self, payload: T) -> Result<()> {
        if self.is_disposed() {
            return Ok(());
        }
        match self.stage.on_next(&payload, &self.downstream)? {
            Propagation::Stop => Ok(()),
            Propagation::Continue => self.forward(payload),
            Propagation::Last => {
                let result = self.forward(payload);
                self.dispose();
                result
            }
        }
    }

    pub(crate) fn forward(&self, payload: T) -> Result<()> {
        match self.fan_out(&payload) {
            Ok(()) => Ok(()),
            Err(error) => self.stage.on_error(error, &payload),
        }
    }

    fn fan_out(&self, payload: &T) -> Result<()> {
        for continuation in self.next.snapshot() {
            if self.is_disposed() {
                break;
            }
            continuation(payload)?;
        }
        Ok(())
    }
}

impl<T: Event> NodeInner<T, Awaited> {
    pub(crate) async fn raise(self: Arc<Self>, payload: T) -> Result<()> {
        if self.is_disposed() {
            return Ok(());
        }
        match self.stage.on_next(&payload, &self.downstream)? {
            Propagation::Stop => Ok(()),
            Propagation::Continue => self.forward(payload).await,
            Propagation::Last => {
                let result = self.clone().forward(payload).await;
                self.dispose();
                result
            }
        }
    }

    pub(crate) async fn forward(self: Arc<Self>, payload: T) -> Result<()> {
        match self.fan_out(payload.clone()).await {
            Ok(()) => Ok(()),
            Err(error) => self.stage.on_error_async(error, payload).await,
        }
    }

    async fn fan_out(&self, payload: T) -> Result<()> {
        for continuation in self.next.snapshot() {
            if self.is_disposed() {
                break;
            }
            continuation(payload.clone()).await?;
        }
        Ok(())
    }
}

impl<T: Event, M: Mode> Drop for NodeInner<T, M> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// One stage of an event chain.
///
/// A node holds a single [`Stage`], subscribes to its upstream when built and
/// raises its own children when the stage lets an event through. Nodes built
/// with the chaining methods own their parent: disposing (or dropping) the
/// terminal node tears the whole chain down.
pub struct Node<T: Event, M: Mode = Direct> {
    inner: Arc<NodeInner<T, M>>,
}

impl<T: Event, M: Mode> Node<T, M> {
    pub(crate) fn with_stage(stage: impl Stage<T>) -> Self {
        let inner = Arc::new_cyclic(|weak| NodeInner {
            lifecycle: Lifecycle::new(),
            next: Signal::new(),
            stage: Box::new(stage),
            links: Mutex::new(Vec::new()),
            downstream: Downstream::bound::<M>(weak.clone()),
        });
        Self { inner }
    }

    /// Subscribes this node to `upstream`, passing every payload through `map`.
    pub(crate) fn link_mapped<S, U>(
        &self,
        upstream: &U,
        tie: Tie,
        map: impl Fn(&S) -> Result<Option<T>> + Send + Sync + 'static,
    ) where
        S: Event,
        U: Upstream<S, M>,
    {
        let weak = Arc::downgrade(&self.inner);
        let subscription = upstream.subscribe(M::relay(weak.clone(), map));
        let watcher = if tie.follows {
            upstream.lifecycle().on_disposed(move || {
                if let Some(node) = weak.upgrade() {
                    node.dispose();
                }
            })
        } else {
            None
        };

        let upstream = upstream.clone();
        self.inner.push_link(Link::new(move || {
            upstream.unsubscribe(subscription);
            if let Some(key) = watcher {
                upstream.lifecycle().remove(key);
            }
            if tie.owns {
                upstream.dispose();
            }
        }));
    }

    pub(crate) fn link<U: Upstream<T, M>>(&self, upstream: &U, tie: Tie) {
        self.link_mapped(upstream, tie, |payload: &T| Ok(Some(payload.clone())));
    }

    pub(crate) fn push_link(&self, link: Link) {
        self.inner.push_link(link);
    }

    pub(crate) fn downgrade(&self) -> std::sync::Weak<NodeInner<T, M>> {
        Arc::downgrade(&self.inner)
    }

    /// Builds a node running `stage` on top of `upstream` without owning it.
    ///
    /// Disposing the new node only detaches it; `upstream` keeps serving its
    /// other subscribers. Disposing `upstream` still tears the new node down.
    pub fn attach<U: Upstream<T, M>>(upstream: &U, stage: impl Stage<T>) -> Self {
        let node = Self::with_stage(stage);
        node.link(upstream, Tie::BORROWED);
        node
    }

    /// Root node observing `upstream` with no behavior of its own.
    pub fn observe<U: Upstream<T, M>>(upstream: &U) -> Self {
        Self::attach(upstream, Pass)
    }

    /// Appends `stage` to the chain; the new node owns `self`.
    pub fn pipe(self, stage: impl Stage<T>) -> Self {
        let node = Self::with_stage(stage);
        node.link(&self, Tie::OWNED);
        node
    }

    /// Number of continuations currently subscribed to this node.
    pub fn subscriber_count(&self) -> usize {
        self.inner.next.len()
    }
}

impl<T: Event> Node<T, Direct> {
    /// Runs the node's stage and children on the calling thread.
    pub fn raise(&self, payload: T) -> Result<()> {
        self.inner.raise(payload)
    }
}

impl<T: Event> Node<T, Awaited> {
    /// Runs the node's stage and awaits its children.
    pub async fn raise(&self, payload: T) -> Result<()> {
        self.inner.clone().raise(payload).await
    }
}

impl<T: Event, M: Mode> Upstream<T, M> for Node<T, M> {
    fn subscribe(&self, continuation: M::Continuation<T>) -> Subscription {
        self.inner.next.subscribe(continuation)
    }

    fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.inner.next.unsubscribe(subscription)
    }
}

impl<T: Event, M: Mode> Dispose for Node<T, M> {
    fn lifecycle(&self) -> &Lifecycle {
        &self.inner.lifecycle
    }

    fn dispose(&self) {
        self.inner.dispose();
    }
}

impl<T: Event, M: Mode> Clone for Node<T, M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Event, M: Mode> fmt::Debug for Node<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("stage", &self.inner.stage.name())
            .field("disposed", &self.inner.is_disposed())
            .field("subscribers", &self.inner.next.len())
            .finish()
    }
}
