//! `Watchable<S>`: a mutable, watchable container. Backs both a
//! component's private state cell and the "derived watched value"
//! projection spec.md §3 calls `watch` (see `ComponentOpts::watch`).
//!
//! Exposes exactly the three operations spec.md §9's "Watchers" design note
//! names: `read`, `swap(fn)`, `subscribe(callback)` — here `subscribe`
//! returns a `tokio::sync::watch::Receiver`, whose own `changed()` future
//! plays the role of the callback.

use tokio::sync::watch;

/// A watched cell over `S`. Reads are always permitted concurrently; writes
/// go through `swap` and are expected to be serialized by the owning
/// component (spec.md §5: "the state cell is... mutated solely from that
/// component's own handler invocations").
pub struct Watchable<S> {
    tx: watch::Sender<S>,
}

impl<S> Watchable<S>
where
    S: Clone + PartialEq + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(initial: S) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Reads the current value.
    #[must_use]
    pub fn read(&self) -> S {
        self.tx.borrow().clone()
    }

    /// Applies `f` to the current value and stores the result. Subscribers
    /// are notified only if the new value differs from the old one — this
    /// is the dedup half of spec.md §4.6's "no snapshot is published unless
    /// the state actually changed" invariant.
    pub fn swap(&self, f: impl FnOnce(&S) -> S) {
        self.tx.send_if_modified(|current| {
            let next = f(current);
            if next == *current {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    /// A receiver whose `changed()` fires on every value-changing `swap`.
    /// This is the change watcher's subscription point (spec.md §4.6).
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.tx.subscribe()
    }
}
