//! "The visible tree changed" signal.

use crossbeam_channel::{Receiver, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Payload-free change marker delivered to channel subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeChanged;

type Callback = Box<dyn Fn() + Send + Sync>;

/// Fan-out of change notifications.
///
/// Delivery is synchronous: every subscriber sees a fire before `fire` returns.
/// Callbacks run on the firing task and must not call back into the tree.
#[derive(Default)]
pub struct ChangeBus {
    callbacks: Mutex<Vec<Callback>>,
    channels: Mutex<Vec<Sender<TreeChanged>>>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        lock(&self.callbacks).push(Box::new(callback));
    }

    /// Unbounded so that no fire is ever dropped.
    pub fn subscribe_channel(&self) -> Receiver<TreeChanged> {
        let (tx, rx) = crossbeam_channel::unbounded();
        lock(&self.channels).push(tx);
        rx
    }

    pub fn fire(&self) {
        for callback in lock(&self.callbacks).iter() {
            callback();
        }
        lock(&self.channels).retain(|tx| tx.send(TreeChanged).is_ok());
        log::trace!("tree changed");
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.callbacks).len() + lock(&self.channels).len()
    }
}

/// A subscriber that panicked mid-fire leaves the list intact, so keep using it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl std::fmt::Debug for ChangeBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_every_fire_reaches_every_subscriber() {
        let bus = ChangeBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_cb = hits.clone();
        bus.subscribe(move || {
            hits_cb.fetch_add(1, Ordering::SeqCst);
        });
        let rx = bus.subscribe_channel();

        bus.fire();
        bus.fire();

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(rx.try_iter().count(), 2);
    }

    #[test]
    fn test_fires_survive_a_panicking_subscriber() {
        let bus = ChangeBus::new();
        let panicked = Arc::new(AtomicUsize::new(0));
        let panicked_cb = panicked.clone();
        bus.subscribe(move || {
            if panicked_cb.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("subscriber failed");
            }
        });
        let rx = bus.subscribe_channel();

        let first = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| bus.fire()));
        assert!(first.is_err());

        bus.fire();
        bus.subscribe(|| {});
        assert_eq!(panicked.load(Ordering::SeqCst), 2);
        assert_eq!(rx.try_iter().count(), 1);
        assert_eq!(bus.subscriber_count(), 3);
    }

    #[test]
    fn test_dropped_receivers_are_pruned() {
        let bus = ChangeBus::new();
        let rx = bus.subscribe_channel();
        assert_eq!(bus.subscriber_count(), 1);
        drop(rx);
        bus.fire();
        assert_eq!(bus.subscriber_count(), 0);
    }
}
