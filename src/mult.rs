//! `Mult<T>`: a fan-out primitive where every subscriber receives every
//! message and a slow subscriber back-pressures the source (spec.md §9).
//!
//! Built over per-subscriber bounded `mpsc` channels rather than
//! `tokio::sync::broadcast`: broadcast drops messages for a lagging
//! receiver instead of applying back-pressure to the producer, which
//! contradicts the spec's explicit requirement.

use tokio::sync::{mpsc, Mutex};
use std::sync::Arc;

/// Handle used to register new subscribers against a running fan-out task.
/// Cloning is cheap; every clone shares the same subscriber list.
#[derive(Clone)]
pub struct Mult<T> {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<T>>>>,
}

impl<T: Clone + Send + 'static> Mult<T> {
    /// Spawns the forwarding task reading from `source` and returns the
    /// handle used to add subscribers. The task runs until `source` closes.
    pub fn spawn(mut source: mpsc::Receiver<T>) -> Self {
        let subscribers: Arc<Mutex<Vec<mpsc::Sender<T>>>> = Arc::new(Mutex::new(Vec::new()));
        let task_subscribers = Arc::clone(&subscribers);
        tokio::spawn(async move {
            while let Some(item) = source.recv().await {
                let mut subs = task_subscribers.lock().await;
                subs.retain(|tx| !tx.is_closed());
                for tx in subs.iter() {
                    // awaiting each send is what makes a slow subscriber
                    // back-pressure the source, per spec.md §9.
                    let _ = tx.send(item.clone()).await;
                }
            }
        });
        Self { subscribers }
    }

    /// Registers a new subscriber with the given mailbox depth and returns
    /// its receiving end. Every message sent to the source after this call
    /// returns is delivered to the new subscriber as well.
    pub async fn subscribe(&self, bufsz: usize) -> mpsc::Receiver<T> {
        let (tx, rx) = mpsc::channel(bufsz);
        self.subscribers.lock().await.push(tx);
        rx
    }
}
