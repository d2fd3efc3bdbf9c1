//! Snapshot publication (spec.md §4.5) and the change watcher that drives
//! it automatically (spec.md §4.6).
//!
//! Only the "immediate" discipline is implemented: a snapshot goes out the
//! moment the state cell reports a real change, with no frame-tick/60Hz
//! rate limiting. That alternative discipline belongs to a UI-facing
//! adapter sitting in front of a component, not to the component itself —
//! see DESIGN.md.

use crate::firehose::cmp_publish_state;
use crate::handler::PublishFn;
use crate::message::{ComponentId, Envelope, Msg, MsgMeta};
use crate::state::Watchable;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Projects the component's private state `S` onto the published snapshot
/// type `V`. Defaults to identity when `S = V` (spec.md §3's `watch` option).
pub type XformFn<S, V> = Arc<dyn Fn(&S) -> V + Send + Sync>;

#[must_use]
pub fn identity_xform<S>() -> XformFn<S, S>
where
    S: Clone + Send + Sync + 'static,
{
    Arc::new(Clone::clone)
}

/// Builds the snapshot publication function: read current state, project
/// it through `xform`, publish `(app-state, snapshot)` on the sliding-out
/// channel with `meta.from = cmp_id` (spec.md §4.5), and — gated on
/// `snapshots_on_firehose` — mirror it onto the firehose as
/// `firehose/cmp-publish-state`.
pub fn build_publisher<S, V>(
    cmp_id: ComponentId,
    watched: Arc<Watchable<S>>,
    xform: XformFn<S, V>,
    sliding_out_tx: watch::Sender<Option<Envelope>>,
    firehose_tx: mpsc::Sender<Envelope>,
    snapshots_on_firehose: bool,
) -> PublishFn
where
    S: Clone + PartialEq + Send + Sync + 'static,
    V: Clone + Serialize + Send + Sync + 'static,
{
    Arc::new(move || {
        let snapshot = xform(&watched.read());
        let payload = serde_json::to_value(&snapshot).unwrap_or(serde_json::Value::Null);
        let envelope = Envelope {
            msg: Msg::new(crate::firehose::app_state(), payload.clone()),
            meta: MsgMeta {
                from: Some(cmp_id.clone()),
                ..Default::default()
            },
        };
        let _ = sliding_out_tx.send(Some(envelope));

        if snapshots_on_firehose {
            let cmp_id = cmp_id.clone();
            let firehose_tx = firehose_tx.clone();
            tokio::spawn(async move {
                let envelope = Envelope {
                    msg: Msg::new(
                        cmp_publish_state(),
                        serde_json::json!({ "cmp_id": cmp_id.0, "snapshot": payload }),
                    ),
                    meta: MsgMeta::default(),
                };
                let _ = firehose_tx.send(envelope).await;
            });
        }
    })
}

/// Spawns the task that calls `publish` every time `watched` reports a
/// real value change. This is the automatic half of snapshot publication;
/// `cmd/publish-state` triggers the same `publish` manually.
pub fn spawn_change_watcher<S>(watched: Arc<Watchable<S>>, publish: PublishFn)
where
    S: Clone + PartialEq + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut sub = watched.subscribe();
        while sub.changed().await.is_ok() {
            publish();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publisher_sends_projected_snapshot() {
        let watched = Arc::new(Watchable::new(41_i32));
        let (out_tx, mut out_rx) = watch::channel(None);
        let (fh_tx, _fh_rx) = mpsc::channel(4);

        let publish = build_publisher(
            ComponentId::new("c1"),
            Arc::clone(&watched),
            identity_xform(),
            out_tx,
            fh_tx,
            false,
        );

        watched.swap(|v| v + 1);
        publish();
        out_rx.changed().await.unwrap();
        let got = out_rx.borrow().clone().unwrap();
        assert_eq!(got.msg.msg_type, crate::firehose::app_state());
        assert_eq!(got.msg.payload, serde_json::json!(42));
        assert_eq!(got.meta.from, Some(ComponentId::new("c1")));
    }

    #[tokio::test]
    async fn change_watcher_publishes_only_on_real_change() {
        let watched = Arc::new(Watchable::new(0_i32));
        let (out_tx, mut out_rx) = watch::channel(None);
        let (fh_tx, _fh_rx) = mpsc::channel(4);

        let publish = build_publisher(
            ComponentId::new("c1"),
            Arc::clone(&watched),
            identity_xform(),
            out_tx,
            fh_tx,
            false,
        );
        spawn_change_watcher(Arc::clone(&watched), publish);

        watched.swap(|_| 0); // no-op, must not publish
        watched.swap(|v| v + 1);
        out_rx.changed().await.unwrap();
        assert_eq!(out_rx.borrow().clone().unwrap().msg.payload, serde_json::json!(1));
    }
}
