//! The two handler loops (spec.md §4.4): one draining the ordered
//! in-channel, one draining the sliding in-channel. The ordered loop does
//! handler-map lookup, then an unhandled-message fallback, then a catch-all
//! that always runs; the sliding loop instead invokes a single designated
//! state-snapshot handler, if one is configured. Both share the same panic
//! boundary, so a misbehaving handler drops one message instead of taking
//! the whole component down.

use crate::emit::EmitFn;
use crate::firehose::{cmp_recv, cmp_recv_state};
use crate::message::{ComponentId, Envelope, MsgType};
use crate::state::Watchable;
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, warn};

/// Everything a handler needs: the message it was invoked for, this
/// component's state cell, its emit path, and a way to trigger an
/// out-of-band snapshot publication (used by the built-in
/// `cmd/publish-state` handler, but available to any handler).
pub struct HandlerContext<S> {
    pub cmp_id: ComponentId,
    pub envelope: Envelope,
    pub state: Arc<Watchable<S>>,
    pub emit: EmitFn,
    pub publish: PublishFn,
}

impl<S> HandlerContext<S> {
    #[must_use]
    pub fn msg_type(&self) -> &MsgType {
        &self.envelope.msg.msg_type
    }

    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.envelope.msg.payload
    }
}

/// Triggers an out-of-cycle snapshot publication. Synchronous: publishing a
/// snapshot is just a `watch` send plus an optional firehose emit, neither
/// of which ever suspends.
pub type PublishFn = Arc<dyn Fn() + Send + Sync>;

/// A unit of dispatch. Implemented directly (not via a closure blanket
/// impl) so handler state — counters, clients, whatever a concrete
/// handler needs — lives naturally on the implementing type, the same
/// shape the teacher's `Gene`/`Operator` traits use.
#[async_trait]
pub trait Handler<S>: Send + Sync {
    async fn handle(&self, ctx: &HandlerContext<S>);
}

pub type HandlerMap<S> = HashMap<MsgType, Arc<dyn Handler<S>>>;

async fn dispatch<S: Send + Sync + 'static>(
    cmp_id: &ComponentId,
    ctx: HandlerContext<S>,
    handlers: &HandlerMap<S>,
    unhandled: Option<&Arc<dyn Handler<S>>>,
    catch_all: Option<&Arc<dyn Handler<S>>>,
) {
    let msg_type = ctx.msg_type().clone();
    let found = handlers.get(&msg_type).cloned();

    match found {
        Some(handler) => run_guarded(cmp_id, &ctx, handler.as_ref()).await,
        None => {
            if let Some(handler) = unhandled {
                run_guarded(cmp_id, &ctx, handler.as_ref()).await;
            } else {
                warn!(cmp_id = %cmp_id, msg_type = %msg_type, "no handler registered");
            }
        }
    }

    if let Some(handler) = catch_all {
        run_guarded(cmp_id, &ctx, handler.as_ref()).await;
    }
}

/// Runs `handler.handle(ctx)` behind a panic boundary: a panicking handler
/// logs and is treated as a dropped message, not a crashed component.
async fn run_guarded<S: Send + Sync>(
    cmp_id: &ComponentId,
    ctx: &HandlerContext<S>,
    handler: &(dyn Handler<S> + '_),
) {
    let msg_type = ctx.msg_type().clone();
    let result = AssertUnwindSafe(handler.handle(ctx)).catch_unwind().await;
    if let Err(panic) = result {
        let reason = panic
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(cmp_id = %cmp_id, msg_type = %msg_type, reason = %reason, "handler panicked, message dropped");
    }
}

/// Configuration shared by both loops: whether to emit a `firehose/cmp-recv*`
/// record for each inbound message, and where to send it. The two paths are
/// gated by different config flags (spec.md §3/§4.4): the ordered path's
/// `firehose/cmp-recv` by `msgs_on_firehose`, the sliding path's
/// `firehose/cmp-recv-state` by `snapshots_on_firehose`.
pub struct ReceiveFirehose {
    pub msgs_on_firehose: bool,
    pub snapshots_on_firehose: bool,
    pub firehose_tx: mpsc::Sender<Envelope>,
}

impl ReceiveFirehose {
    async fn record(&self, cmp_id: &ComponentId, envelope: &Envelope, sliding: bool) {
        let gated_on = if sliding {
            self.snapshots_on_firehose
        } else {
            self.msgs_on_firehose
        };
        if !gated_on || envelope.msg.msg_type.is_firehose() {
            return;
        }
        let payload = if sliding {
            serde_json::json!({
                "cmp_id": cmp_id.0,
                "msg": envelope.msg,
            })
        } else {
            serde_json::json!({
                "cmp_id": cmp_id.0,
                "msg": envelope.msg,
                "msg_meta": envelope.meta,
                "ts": crate::message::now_millis(),
            })
        };
        let wrapped = Envelope {
            msg: crate::message::Msg::new(
                if sliding { cmp_recv_state() } else { cmp_recv() },
                payload,
            ),
            meta: crate::message::MsgMeta::default(),
        };
        let _ = self.firehose_tx.send(wrapped).await;
    }
}

/// Spawns the loop draining the ordered in-channel. Runs until `in_rx`
/// closes.
pub fn spawn_ordered_loop<S: Send + Sync + 'static>(
    cmp_id: ComponentId,
    mut in_rx: mpsc::Receiver<Envelope>,
    state: Arc<Watchable<S>>,
    emit: EmitFn,
    publish: PublishFn,
    handlers: HandlerMap<S>,
    unhandled: Option<Arc<dyn Handler<S>>>,
    catch_all: Option<Arc<dyn Handler<S>>>,
    firehose: ReceiveFirehose,
) {
    tokio::spawn(async move {
        while let Some(mut envelope) = in_rx.recv().await {
            stamp_inbound(&cmp_id, &mut envelope);
            firehose.record(&cmp_id, &envelope, false).await;
            let ctx = HandlerContext {
                cmp_id: cmp_id.clone(),
                envelope,
                state: Arc::clone(&state),
                emit: emit.clone(),
                publish: Arc::clone(&publish),
            };
            dispatch(&cmp_id, ctx, &handlers, unhandled.as_ref(), catch_all.as_ref()).await;
        }
    });
}

/// spec.md §4.4 step 2: append `cmp_id` to `cmp_seq` with direction `In`
/// and stamp `in_ts`, in place, before dispatch.
fn stamp_inbound(cmp_id: &ComponentId, envelope: &mut Envelope) {
    crate::message::append_cmp_seq(&mut envelope.meta, cmp_id, crate::message::Direction::In);
    envelope
        .meta
        .timings
        .entry(cmp_id.clone())
        .or_default()
        .in_ts = Some(crate::message::now_millis());
}

/// Spawns the loop draining the sliding in-channel. Unlike the ordered
/// path, there is no handler-map lookup here: spec.md §4.4's sliding-input
/// path invokes a single designated "state-snapshot handler (if
/// configured)", not the ordered registry — so a sliding-input message can
/// never trigger the built-in `cmd/get-state`/`cmd/publish-state` handlers
/// or any caller-registered ordered-path handler. After dispatch the loop
/// suspends for `throttle_ms` before looking at the channel again — the
/// mechanism behind "the sliding path never falls behind, but never runs
/// faster than `throttle-ms` either" (spec.md §4.4).
pub fn spawn_sliding_loop<T, S>(
    cmp_id: ComponentId,
    mut sliding_rx: watch::Receiver<Option<T>>,
    to_envelope: impl Fn(T) -> Envelope + Send + 'static,
    state: Arc<Watchable<S>>,
    emit: EmitFn,
    publish: PublishFn,
    state_pub_handler: Option<Arc<dyn Handler<S>>>,
    firehose: ReceiveFirehose,
    throttle_ms: u64,
) where
    T: Clone + Send + 'static,
    S: Send + Sync + 'static,
{
    tokio::spawn(async move {
        while sliding_rx.changed().await.is_ok() {
            let value = sliding_rx.borrow_and_update().clone();
            let Some(value) = value else { continue };
            let mut envelope = to_envelope(value);
            stamp_inbound(&cmp_id, &mut envelope);
            firehose.record(&cmp_id, &envelope, true).await;
            if let Some(handler) = state_pub_handler.as_ref() {
                let ctx = HandlerContext {
                    cmp_id: cmp_id.clone(),
                    envelope,
                    state: Arc::clone(&state),
                    emit: emit.clone(),
                    publish: Arc::clone(&publish),
                };
                run_guarded(&cmp_id, &ctx, handler.as_ref()).await;
            }
            tokio::time::sleep(Duration::from_millis(throttle_ms)).await;
        }
    });
}
