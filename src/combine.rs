//! Fan-in: many upstreams, one downstream emission point.

use crate::error::{Error, Result};
use crate::event::Event;
use crate::mode::Mode;
use crate::node::{Node, Tie};
use crate::source::Source;
use crate::stage::Pass;
use std::any::{Any, type_name};

/// What a coercing combine does with a payload that is absent or of another
/// type than its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Coercion {
    /// Substitute `U::default()`. This loses the original payload silently.
    #[default]
    Default,
    /// Drop the event.
    Skip,
    /// Fail the emission with [`Error::Coercion`].
    Strict,
}

impl Coercion {
    /// Reinterprets `payload` as a `U`. An `Option<U>` payload counts as
    /// absent when it is `None`.
    pub fn apply<S, U>(self, payload: &S) -> Result<Option<U>>
    where
        S: Event,
        U: Event + Default,
    {
        let payload = payload as &dyn Any;
        if let Some(value) = payload.downcast_ref::<U>() {
            return Ok(Some(value.clone()));
        }
        if let Some(Some(value)) = payload.downcast_ref::<Option<U>>() {
            return Ok(Some(value.clone()));
        }

        match self {
            Coercion::Default => Ok(Some(U::default())),
            Coercion::Skip => Ok(None),
            Coercion::Strict => Err(Error::Coercion {
                expected: type_name::<U>(),
            }),
        }
    }
}

/// Producer of untyped payloads that a coercing combine can fan in.
pub trait Provider<U: Event, M: Mode>: Send + Sync {
    /// Subscribes `target` to this provider, reinterpreting each payload.
    fn attach(&self, target: &Node<U, M>, coercion: Coercion);
}

impl<S, U, M> Provider<U, M> for Source<S, M>
where
    S: Event,
    U: Event + Default,
    M: Mode,
{
    fn attach(&self, target: &Node<U, M>, coercion: Coercion) {
        target.link_mapped(self, Tie::DETACHED, move |payload: &S| coercion.apply(payload));
    }
}

impl<S, U, M> Provider<U, M> for Node<S, M>
where
    S: Event,
    U: Event + Default,
    M: Mode,
{
    fn attach(&self, target: &Node<U, M>, coercion: Coercion) {
        target.link_mapped(self, Tie::MEMBER, move |payload: &S| coercion.apply(payload));
    }
}

impl<T: Event, M: Mode> Node<T, M> {
    /// Merges already-built chains. The returned node owns every member:
    /// disposing it disposes each member once. A member going away on its own
    /// only removes that member.
    pub fn combine(members: impl IntoIterator<Item = Node<T, M>>) -> Self {
        let node = Self::with_stage(Pass);
        for member in members {
            node.link(&member, Tie::MEMBER);
        }
        node
    }

    /// Fans in raw sources. Disposing the returned node detaches it from each
    /// source without disposing them.
    pub fn merge<'a>(sources: impl IntoIterator<Item = &'a Source<T, M>>) -> Self {
        let node = Self::with_stage(Pass);
        for source in sources {
            node.link(source, Tie::DETACHED);
        }
        node
    }

    /// Fans in heterogeneous providers, reinterpreting every payload as `T`
    /// according to `coercion`.
    pub fn coerce<'a>(
        providers: impl IntoIterator<Item = &'a dyn Provider<T, M>>,
        coercion: Coercion,
    ) -> Self
    where
        T: Default,
    {
        let node = Self::with_stage(Pass);
        for provider in providers {
            provider.attach(&node, coercion);
        }
        node
    }
}
