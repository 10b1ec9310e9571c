use super::{Downstream, Propagation, Stage};
use crate::error::Result;
use crate::event::Event;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Forwards every event and tears the node down after the first one that
/// satisfies the predicate.
pub(crate) struct Until<T> {
    predicate: Box<dyn Fn(&T) -> bool + Send + Sync + 'static>,
}

impl<T: Event> Until<T> {
    pub(crate) fn new(predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Box::new(predicate),
        }
    }
}

impl<T: Event> Stage<T> for Until<T> {
    fn on_next(&self, payload: &T, _: &Downstream<T>) -> Result<Propagation> {
        if (self.predicate)(payload) {
            Ok(Propagation::Last)
        } else {
            Ok(Propagation::Continue)
        }
    }
}

/// Forwards `times` events, then tears the node down.
pub(crate) struct Take {
    remaining: AtomicUsize,
}

impl Take {
    pub(crate) fn new(times: usize) -> Self {
        assert!(times > 0, "limit must be greater than zero, got {times}");
        Self {
            remaining: AtomicUsize::new(times),
        }
    }
}

impl<T: Event> Stage<T> for Take {
    fn on_next(&self, _: &T, _: &Downstream<T>) -> Result<Propagation> {
        match self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(1) => Ok(Propagation::Last),
            Ok(_) => Ok(Propagation::Continue),
            // Lost a race with the final event.
            Err(_) => Ok(Propagation::Stop),
        }
    }
}
