//! `TopicPub<T>`: a `Mult` partitioned by a key function — each subscriber
//! chooses which keys it wants (spec.md §9: "a mult partitioned by a key
//! function (here, first element of the message pair)").

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

struct Subscription<T, K> {
    tx: mpsc::Sender<T>,
    keys: HashSet<K>,
}

/// Fan-out keyed by `key_fn(&T) -> K`. Cloning shares the subscriber list.
#[derive(Clone)]
pub struct TopicPub<T, K> {
    subscribers: Arc<Mutex<Vec<Subscription<T, K>>>>,
}

impl<T, K> TopicPub<T, K>
where
    T: Clone + Send + 'static,
    K: Eq + Hash + Send + Sync + 'static,
{
    /// Spawns the forwarding task reading from `source`, applying `key_fn`
    /// to decide which subscribers receive each item.
    pub fn spawn<F>(mut source: mpsc::Receiver<T>, key_fn: F) -> Self
    where
        F: Fn(&T) -> K + Send + 'static,
    {
        let subscribers: Arc<Mutex<Vec<Subscription<T, K>>>> = Arc::new(Mutex::new(Vec::new()));
        let task_subscribers = Arc::clone(&subscribers);
        tokio::spawn(async move {
            while let Some(item) = source.recv().await {
                let key = key_fn(&item);
                let mut subs = task_subscribers.lock().await;
                subs.retain(|s| !s.tx.is_closed());
                for sub in subs.iter() {
                    if sub.keys.contains(&key) {
                        let _ = sub.tx.send(item.clone()).await;
                    }
                }
            }
        });
        Self { subscribers }
    }

    /// Registers a subscriber interested only in `keys`.
    pub async fn subscribe(&self, bufsz: usize, keys: impl IntoIterator<Item = K>) -> mpsc::Receiver<T> {
        let (tx, rx) = mpsc::channel(bufsz);
        self.subscribers.lock().await.push(Subscription {
            tx,
            keys: keys.into_iter().collect(),
        });
        rx
    }
}
