mod catch;
mod debounce;
mod dispatch;
mod filter;
mod throttle;
mod until;

use crate::dispatcher::{Dispatcher, OnError};
use crate::error::{Error, Result};
use crate::event::Event;
use crate::mode::Mode;
use crate::node::NodeInner;
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use std::sync::{Arc, Weak};

pub(crate) use catch::*;
pub(crate) use debounce::*;
pub(crate) use dispatch::*;
pub(crate) use filter::*;
pub(crate) use throttle::*;
pub(crate) use until::*;

pub use debounce::DebounceOptions;
pub use dispatch::DispatchOptions;
pub use throttle::ThrottleOptions;

/// What a node does with an event once its stage has seen it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Raise the children now, on the current call path.
    Continue,
    /// Do not raise the children from here. The stage may still deliver the
    /// event later through its [`Downstream`].
    Stop,
    /// Raise the children, then dispose the node.
    Last,
}

/// Operator behavior, shared by synchronous and asynchronous chains.
pub trait Stage<T: Event>: Send + Sync + 'static {
    fn on_next(&self, payload: &T, downstream: &Downstream<T>) -> Result<Propagation>;

    /// Failure raised by the children while this stage propagated `payload`.
    /// Returning `Ok` swallows it.
    fn on_error(&self, error: Error, payload: &T) -> Result<()> {
        let _ = payload;
        Err(error)
    }

    /// Asynchronous counterpart of [`on_error`](Stage::on_error), used by
    /// awaited chains.
    fn on_error_async(&self, error: Error, payload: T) -> BoxFuture<'static, Result<()>> {
        future::ready(self.on_error(error, &payload)).boxed()
    }

    /// Releases timers and buffers. Runs once, after the node detached.
    fn on_dispose(&self) {}

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

type Deliver<T> = Arc<dyn Fn(T) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static>;
type Marshal<T> = Arc<dyn Fn(&dyn Dispatcher, T, OnError) + Send + Sync + 'static>;

/// Deferred entry into the children of a node.
///
/// Stages clone it to propagate later, e.g. from a timer. Delivery re-checks
/// the node right before raising the children, so a node disposed in the
/// meantime silently swallows the payload.
pub struct Downstream<T: Event> {
    deliver: Deliver<T>,
    marshal: Marshal<T>,
}

impl<T: Event> Downstream<T> {
    pub(crate) fn bound<M: Mode>(node: Weak<NodeInner<T, M>>) -> Self {
        let target = node.clone();
        Self {
            deliver: Arc::new(move |payload| {
                let node = node.clone();
                async move {
                    match node.upgrade() {
                        Some(node) if !node.is_disposed() => M::forward(node, payload).await,
                        _ => Ok(()),
                    }
                }
                .boxed()
            }),
            marshal: Arc::new(move |dispatcher: &dyn Dispatcher, payload: T, on_error: OnError| {
                M::marshal(dispatcher, target.clone(), payload, on_error)
            }),
        }
    }

    pub fn deliver(&self, payload: T) -> BoxFuture<'static, Result<()>> {
        (self.deliver)(payload)
    }

    /// Delivers `payload` from `dispatcher`: synchronous chains go through
    /// [`Dispatcher::run`], awaited ones through
    /// [`Dispatcher::run_async_with`]. Failures go to `on_error`.
    pub fn deliver_on(&self, dispatcher: &dyn Dispatcher, payload: T, on_error: OnError) {
        (self.marshal)(dispatcher, payload, on_error)
    }
}

impl<T: Event> Clone for Downstream<T> {
    fn clone(&self) -> Self {
        Self {
            deliver: self.deliver.clone(),
            marshal: self.marshal.clone(),
        }
    }
}

/// Identity stage used by roots, junctions and terminals.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pass;

impl<T: Event> Stage<T> for Pass {
    #[inline]
    fn on_next(&self, _: &T, _: &Downstream<T>) -> Result<Propagation> {
        Ok(Propagation::Continue)
    }
}

/// Where deferred work runs and where its failures go.
#[derive(Clone)]
pub(crate) struct Deferred {
    dispatcher: Option<Arc<dyn Dispatcher>>,
    on_error: OnError,
}

impl Deferred {
    pub(crate) fn new(dispatcher: Option<Arc<dyn Dispatcher>>, on_error: Option<OnError>) -> Self {
        Self {
            dispatcher,
            on_error: on_error.unwrap_or_else(OnError::discard),
        }
    }

    /// Hands the delivery to the dispatcher, or awaits it on the current task.
    pub(crate) async fn deliver<T: Event>(&self, downstream: &Downstream<T>, payload: T) {
        match &self.dispatcher {
            Some(dispatcher) => {
                downstream.deliver_on(dispatcher.as_ref(), payload, self.on_error.clone())
            }
            None => {
                if let Err(error) = downstream.deliver(payload).await {
                    self.on_error.report(error);
                }
            }
        }
    }
}
