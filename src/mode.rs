//! Execution flavors.
//!
//! A chain either runs every stage on the caller's stack ([`Direct`]) or as a
//! single awaited continuation ([`Awaited`]). Stages are written once and run
//! under both; only the shape of the continuations between nodes differs.

use crate::dispatcher::{Dispatcher, OnError};
use crate::error::Result;
use crate::event::Event;
use crate::node::NodeInner;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::{Arc, Weak};

/// Synchronous continuation registered on a [`Direct`] source or node.
pub type Callback<T> = Arc<dyn Fn(&T) -> Result<()> + Send + Sync + 'static>;

/// Asynchronous continuation registered on an [`Awaited`] source or node.
pub type AsyncCallback<T> =
    Arc<dyn Fn(T) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static>;

mod sealed {
    pub trait Sealed {}
}

pub trait Mode: sealed::Sealed + Send + Sync + Sized + 'static {
    type Continuation<T: Event>: Clone + Send + Sync + 'static;

    /// Continuation that raises `target` with each mapped payload.
    /// `Ok(None)` from `map` drops the payload.
    #[doc(hidden)]
    fn relay<S, U>(
        target: Weak<NodeInner<U, Self>>,
        map: impl Fn(&S) -> Result<Option<U>> + Send + Sync + 'static,
    ) -> Self::Continuation<S>
    where
        S: Event,
        U: Event;

    /// Sends `payload` to the children of `node`, outside the live call path.
    #[doc(hidden)]
    fn forward<T: Event>(
        node: Arc<NodeInner<T, Self>>,
        payload: T,
    ) -> BoxFuture<'static, Result<()>>;

    /// Hands the delivery of `payload` to `dispatcher`. A node disposed before
    /// the dispatcher gets to it swallows the payload.
    #[doc(hidden)]
    fn marshal<T: Event>(
        dispatcher: &dyn Dispatcher,
        node: Weak<NodeInner<T, Self>>,
        payload: T,
        on_error: OnError,
    );
}

/// Every stage runs inline on the raising thread.
#[derive(Debug)]
pub enum Direct {}

/// Stages are awaited as one logical continuation.
#[derive(Debug)]
pub enum Awaited {}

impl sealed::Sealed for Direct {}
impl sealed::Sealed for Awaited {}

impl Mode for Direct {
    type Continuation<T: Event> = Callback<T>;

    fn relay<S, U>(
        target: Weak<NodeInner<U, Self>>,
        map: impl Fn(&S) -> Result<Option<U>> + Send + Sync + 'static,
    ) -> Callback<S>
    where
        S: Event,
        U: Event,
    {
        Arc::new(move |payload: &S| {
            let Some(target) = target.upgrade() else {
                return Ok(());
            };
            match map(payload)? {
                Some(payload) => target.raise(payload),
                None => Ok(()),
            }
        })
    }

    fn forward<T: Event>(
        node: Arc<NodeInner<T, Self>>,
        payload: T,
    ) -> BoxFuture<'static, Result<()>> {
        async move { node.forward(payload) }.boxed()
    }

    fn marshal<T: Event>(
        dispatcher: &dyn Dispatcher,
        node: Weak<NodeInner<T, Self>>,
        payload: T,
        on_error: OnError,
    ) {
        dispatcher.run(Box::new(move || {
            let Some(node) = node.upgrade() else {
                return;
            };
            if node.is_disposed() {
                return;
            }
            if let Err(error) = node.forward(payload) {
                on_error.report(error);
            }
        }));
    }
}

impl Mode for Awaited {
    type Continuation<T: Event> = AsyncCallback<T>;

    fn relay<S, U>(
        target: Weak<NodeInner<U, Self>>,
        map: impl Fn(&S) -> Result<Option<U>> + Send + Sync + 'static,
    ) -> AsyncCallback<S>
    where
        S: Event,
        U: Event,
    {
        Arc::new(move |payload: S| {
            let mapped = map(&payload);
            let target = target.clone();
            async move {
                let Some(target) = target.upgrade() else {
                    return Ok(());
                };
                match mapped? {
                    Some(payload) => target.raise(payload).await,
                    None => Ok(()),
                }
            }
            .boxed()
        })
    }

    fn forward<T: Event>(
        node: Arc<NodeInner<T, Self>>,
        payload: T,
    ) -> BoxFuture<'static, Result<()>> {
        node.forward(payload).boxed()
    }

    fn marshal<T: Event>(
        dispatcher: &dyn Dispatcher,
        node: Weak<NodeInner<T, Self>>,
        payload: T,
        on_error: OnError,
    ) {
        let work = async move {
            match node.upgrade() {
                Some(node) if !node.is_disposed() => node.forward(payload).await,
                _ => Ok(()),
            }
        };
        dispatcher.run_async_with(work.boxed(), on_error);
    }
}
