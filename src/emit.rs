use crate::error::Result;
use crate::event::Event;
use crate::mode::{Awaited, Direct};
use crate::node::Node;
use crate::source::Source;

/// Raises a payload into a source or node, whatever its flavor.
///
/// Synchronous sources and nodes complete the whole propagation before the
/// returned future is first polled to completion; awaited ones suspend at each
/// continuation.
#[trait_variant::make(Send)]
pub trait Emit<T: Event>: Send + Sync {
    async fn emit(&self, payload: T) -> Result<()>;
}

impl<T: Event> Emit<T> for Source<T, Direct> {
    #[inline]
    async fn emit(&self, payload: T) -> Result<()> {
        Source::<T, Direct>::emit(self, payload)
    }
}

impl<T: Event> Emit<T> for Source<T, Awaited> {
    #[inline]
    async fn emit(&self, payload: T) -> Result<()> {
        Source::<T, Awaited>::emit(self, payload).await
    }
}

impl<T: Event> Emit<T> for Node<T, Direct> {
    #[inline]
    async fn emit(&self, payload: T) -> Result<()> {
        self.raise(payload)
    }
}

impl<T: Event> Emit<T> for Node<T, Awaited> {
    #[inline]
    async fn emit(&self, payload: T) -> Result<()> {
        self.raise(payload).await
    }
}
