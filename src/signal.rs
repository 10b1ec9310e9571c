use std::sync::atomic::{AtomicU64, Ordering};

/// Handle identifying one continuation registered on a source or node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

/// Ordered set of continuations.
///
/// Subscribe and unsubscribe never block an in-flight emission: emitters work
/// on a snapshot taken in subscription order.
pub(crate) struct Signal<C> {
    slots: papaya::HashMap<u64, C>,
    next_key: AtomicU64,
}

impl<C: Clone + Send + Sync + 'static> Signal<C> {
    pub(crate) fn new() -> Self {
        Self {
            slots: papaya::HashMap::new(),
            next_key: AtomicU64::new(0),
        }
    }

    pub(crate) fn subscribe(&self, continuation: C) -> Subscription {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        self.slots.pin().insert(key, continuation);
        Subscription(key)
    }

    pub(crate) fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.slots.pin().remove(&subscription.0).is_some()
    }

    pub(crate) fn clear(&self) {
        self.slots.pin().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.pin().len()
    }

    /// Current continuations in subscription order.
    pub(crate) fn snapshot(&self) -> Vec<C> {
        let slots = self.slots.pin();
        let mut entries: Vec<(u64, C)> = slots
            .iter()
            .map(|(key, continuation)| (*key, continuation.clone()))
            .collect();
        entries.sort_unstable_by_key(|(key, _)| *key);
        entries.into_iter().map(|(_, continuation)| continuation).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_keeps_subscription_order() {
        let signal = Signal::new();
        for i in 0..32 {
            signal.subscribe(i);
        }
        assert_eq!(signal.snapshot(), (0..32).collect::<Vec<_>>());
    }

    #[test]
    fn unsubscribe_removes_only_the_target() {
        let signal = Signal::new();
        let a = signal.subscribe("a");
        signal.subscribe("b");

        assert!(signal.unsubscribe(a));
        assert!(!signal.unsubscribe(a));
        assert_eq!(signal.snapshot(), vec!["b"]);
    }

    #[test]
    fn clear_drops_everything() {
        let signal = Signal::new();
        signal.subscribe(1);
        signal.subscribe(2);
        signal.clear();
        assert_eq!(signal.len(), 0);
        assert!(signal.snapshot().is_empty());
    }
}
