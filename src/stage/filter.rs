use super::{Downstream, Propagation, Stage};
use crate::error::Result;
use crate::event::Event;

type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync + 'static>;

pub(crate) struct Filter<T> {
    predicate: Predicate<T>,
}

impl<T: Event> Filter<T> {
    pub(crate) fn new(predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Box::new(predicate),
        }
    }
}

impl<T: Event> Stage<T> for Filter<T> {
    fn on_next(&self, payload: &T, _: &Downstream<T>) -> Result<Propagation> {
        if (self.predicate)(payload) {
            Ok(Propagation::Continue)
        } else {
            Ok(Propagation::Stop)
        }
    }
}

/// Side-effect tap; always lets the event through.
pub(crate) struct Inspect<T> {
    f: Box<dyn Fn(&T) + Send + Sync + 'static>,
}

impl<T: Event> Inspect<T> {
    pub(crate) fn new(f: impl Fn(&T) + Send + Sync + 'static) -> Self {
        Self { f: Box::new(f) }
    }
}

impl<T: Event> Stage<T> for Inspect<T> {
    fn on_next(&self, payload: &T, _: &Downstream<T>) -> Result<Propagation> {
        (self.f)(payload);
        Ok(Propagation::Continue)
    }
}
