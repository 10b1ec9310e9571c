use super::{Downstream, Propagation, Stage};
use crate::dispatcher::{Dispatcher, OnError};
use crate::error::{Error, Result};
use crate::event::Event;
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub struct DispatchOptions {
    dispatcher: Arc<dyn Dispatcher>,
    on_error: Option<OnError>,
}

impl DispatchOptions {
    pub fn new(dispatcher: impl Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            on_error: None,
        }
    }

    /// Receives failures raised downstream once work crossed into the
    /// dispatcher. Without it those failures are dropped.
    pub fn on_error(mut self, f: impl Fn(Error) + Send + Sync + 'static) -> Self {
        self.on_error = Some(OnError::new(f));
        self
    }
}

impl fmt::Debug for DispatchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchOptions")
            .field("on_error", &self.on_error.is_some())
            .finish_non_exhaustive()
    }
}

/// Marshals the rest of the chain onto a dispatcher.
pub(crate) struct Dispatch {
    dispatcher: Arc<dyn Dispatcher>,
    on_error: OnError,
}

impl Dispatch {
    pub(crate) fn new(options: DispatchOptions) -> Self {
        Self {
            dispatcher: options.dispatcher,
            on_error: options.on_error.unwrap_or_else(OnError::discard),
        }
    }
}

impl<T: Event> Stage<T> for Dispatch {
    fn on_next(&self, payload: &T, downstream: &Downstream<T>) -> Result<Propagation> {
        tracing::trace!("dispatching continuation");
        downstream.deliver_on(
            self.dispatcher.as_ref(),
            payload.clone(),
            self.on_error.clone(),
        );
        Ok(Propagation::Stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{Action, QueueDispatcher, TokioDispatcher};
    use crate::lifecycle::Dispose;
    use crate::mode::Awaited;
    use crate::source::Source;
    use std::sync::Mutex;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Runs actions inline and spawns futures, counting each entry point.
    #[derive(Clone, Default)]
    struct Counting {
        actions: Arc<AtomicUsize>,
        futures: Arc<AtomicUsize>,
    }

    impl Dispatcher for Counting {
        fn run(&self, action: Action) {
            self.actions.fetch_add(1, Ordering::SeqCst);
            action();
        }

        fn run_async(&self, action: BoxFuture<'static, ()>) {
            self.futures.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(action);
        }
    }

    #[tokio::test]
    async fn continuation_waits_for_the_dispatcher() {
        let source = Source::<u32>::new();
        let queue = QueueDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _chain = source.observe().dispatch(queue.clone()).on(move |value| {
            sink.lock().unwrap().push(*value);
            Ok(())
        });

        source.emit(1).unwrap();
        source.emit(2).unwrap();
        assert!(seen.lock().unwrap().is_empty());

        assert_eq!(queue.run_pending().await, 2);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn failures_after_the_hop_do_not_reach_the_emitter() {
        let source = Source::<u32>::new();
        let queue = QueueDispatcher::new();
        let failures = Arc::new(AtomicUsize::new(0));
        let counter = failures.clone();
        let _chain = source
            .observe()
            .dispatch_with(DispatchOptions::new(queue.clone()).on_error(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .on(|_| Err(Error::msg("after the hop")));

        assert!(source.emit(1).is_ok());
        queue.run_pending().await;
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disposal_before_the_hop_drops_the_payload() {
        let source = Source::<u32>::new();
        let queue = QueueDispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let chain = source.observe().dispatch(queue.clone()).on(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        source.emit(1).unwrap();
        chain.dispose();
        queue.run_pending().await;

        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn awaited_chain_hops_onto_the_runtime() {
        let source = Source::<u32, Awaited>::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _chain = source
            .observe()
            .dispatch(TokioDispatcher::current())
            .on(move |value| {
                let tx = tx.clone();
                async move {
                    tx.send(value).map_err(Error::new)?;
                    Ok(())
                }
            });

        source.emit(9).await.unwrap();
        assert_eq!(rx.recv().await, Some(9));
    }

    #[test]
    fn synchronous_chains_hop_through_plain_actions() {
        let source = Source::<u32>::new();
        let dispatcher = Counting::default();
        let failures = Arc::new(AtomicUsize::new(0));
        let counter = failures.clone();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _chain = source
            .observe()
            .dispatch_with(DispatchOptions::new(dispatcher.clone()).on_error(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .on(move |value| {
                sink.lock().unwrap().push(*value);
                if *value == 2 {
                    return Err(Error::msg("rejected"));
                }
                Ok(())
            });

        source.emit(1).unwrap();
        source.emit(2).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        assert_eq!(dispatcher.actions.load(Ordering::SeqCst), 2);
        assert_eq!(dispatcher.futures.load(Ordering::SeqCst), 0);
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn awaited_chains_hop_through_futures() {
        let source = Source::<u32, Awaited>::new();
        let dispatcher = Counting::default();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _chain = source
            .observe()
            .dispatch(dispatcher.clone())
            .on(move |value| {
                let tx = tx.clone();
                async move {
                    tx.send(value).map_err(Error::new)?;
                    Ok(())
                }
            });

        source.emit(4).await.unwrap();
        assert_eq!(rx.recv().await, Some(4));
        assert_eq!(dispatcher.actions.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.futures.load(Ordering::SeqCst), 1);
    }
}
