use super::{Downstream, Propagation, Stage};
use crate::error::{Error, Result};
use crate::event::Event;
use futures::FutureExt;
use futures::future::BoxFuture;

type Handler<T> = Box<dyn Fn(&Error, &T) -> bool + Send + Sync + 'static>;
type AsyncHandler<T> = Box<dyn Fn(Error, T) -> BoxFuture<'static, bool> + Send + Sync + 'static>;

/// Failure boundary around everything below it.
///
/// The handler sees each failure once. `true` swallows it, `false` rethrows
/// the original failure to the caller.
pub(crate) struct Catch<T> {
    handler: Handler<T>,
}

impl<T: Event> Catch<T> {
    pub(crate) fn new(handler: impl Fn(&Error, &T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
        }
    }
}

impl<T: Event> Stage<T> for Catch<T> {
    fn on_next(&self, _: &T, _: &Downstream<T>) -> Result<Propagation> {
        Ok(Propagation::Continue)
    }

    fn on_error(&self, error: Error, payload: &T) -> Result<()> {
        if (self.handler)(&error, payload) {
            tracing::trace!(%error, "failure handled");
            Ok(())
        } else {
            Err(error)
        }
    }
}

/// [`Catch`] with an awaited handler. Only reachable from awaited chains.
pub(crate) struct CatchAsync<T> {
    handler: AsyncHandler<T>,
}

impl<T: Event> CatchAsync<T> {
    pub(crate) fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(Error, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        Self {
            handler: Box::new(move |error, payload| handler(error, payload).boxed()),
        }
    }
}

impl<T: Event> Stage<T> for CatchAsync<T> {
    fn on_next(&self, _: &T, _: &Downstream<T>) -> Result<Propagation> {
        Ok(Propagation::Continue)
    }

    fn on_error_async(&self, error: Error, payload: T) -> BoxFuture<'static, Result<()>> {
        let handled = (self.handler)(error.clone(), payload);
        async move {
            if handled.await {
                tracing::trace!(%error, "failure handled");
                Ok(())
            } else {
                Err(error)
            }
        }
        .boxed()
    }
}
