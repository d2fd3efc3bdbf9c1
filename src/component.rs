//! The component factory (spec.md §4.7) and its external interface,
//! `ComponentHandle` (spec.md §6), plus the startup-buffering lifecycle
//! hooks (spec.md §4.8).
//!
//! Construction is staged to resolve the cyclic dependency spec.md §9
//! calls out — the emit function needs the put-channel before the handler
//! loops exist to use it, and the out-channel's fan-out needs to exist
//! before anything can be spliced into it — by building channels first,
//! then `emit`, then state, then the publisher, then the fan-out stages,
//! then the change watcher, then the two handler loops, and only then
//! opening the gate between the put-channel and the out-channel.

use crate::channels::{build_fifo, build_sliding, BufferSpec};
use crate::emit::EmitFn;
use crate::error::ConfigError;
use crate::firehose::state_snapshot;
use crate::handler::{
    spawn_ordered_loop, spawn_sliding_loop, Handler, HandlerContext, HandlerMap, PublishFn,
    ReceiveFirehose,
};
use crate::message::{ComponentId, Envelope, Msg, MsgMeta};
use crate::mult::Mult;
use crate::snapshot::{build_publisher, spawn_change_watcher, XformFn};
use crate::state::Watchable;
use crate::topic_pub::TopicPub;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Notify};

/// The options table from spec.md §3. Every field has the default spec.md
/// names as authoritative; `ComponentOpts::default()` matches it exactly.
#[derive(Clone)]
pub struct ComponentOpts {
    pub in_chan: BufferSpec,
    pub sliding_in_chan: BufferSpec,
    pub out_chan: BufferSpec,
    pub sliding_out_chan: BufferSpec,
    pub firehose_chan: BufferSpec,
    pub throttle_ms: u64,
    pub msgs_on_firehose: bool,
    pub snapshots_on_firehose: bool,
    /// Development flag honoured by the switchboard; this crate never reads
    /// it. Carried here only so `ComponentOpts` is a complete record of
    /// spec.md §3's options table.
    pub reload_cmp: bool,
}

impl Default for ComponentOpts {
    fn default() -> Self {
        Self {
            in_chan: BufferSpec::buffer(1),
            sliding_in_chan: BufferSpec::sliding(1),
            out_chan: BufferSpec::buffer(1),
            sliding_out_chan: BufferSpec::sliding(1),
            firehose_chan: BufferSpec::buffer(1),
            throttle_ms: 1,
            msgs_on_firehose: true,
            snapshots_on_firehose: true,
            reload_cmp: true,
        }
    }
}

/// Releases any resources the user's state initializer acquired. Invoked
/// once, from [`ComponentHandle::shutdown`].
pub type ShutdownFn = Box<dyn FnOnce() + Send>;

struct BuiltinGetState<S, V> {
    xform: XformFn<S, V>,
}

#[async_trait]
impl<S, V> Handler<S> for BuiltinGetState<S, V>
where
    S: Send + Sync + 'static,
    V: Serialize + Send + Sync + 'static,
{
    async fn handle(&self, ctx: &HandlerContext<S>) {
        let snapshot = (self.xform)(&ctx.state.read());
        let payload = serde_json::to_value(&snapshot).unwrap_or(Value::Null);
        ctx.emit
            .emit(
                Msg::new(
                    state_snapshot(),
                    serde_json::json!({ "cmp_id": ctx.cmp_id.0, "snapshot": payload }),
                ),
                None,
            )
            .await;
    }
}

struct BuiltinPublishState;

#[async_trait]
impl<S: Send + Sync + 'static> Handler<S> for BuiltinPublishState {
    async fn handle(&self, ctx: &HandlerContext<S>) {
        (ctx.publish)();
    }
}

/// The external interface to a running component (spec.md §6): the two
/// in-channels a caller feeds, the out-channel's two fan-out stages, the
/// sliding-out snapshot, and the firehose fan-out.
pub struct ComponentHandle<V> {
    pub cmp_id: ComponentId,
    pub in_tx: mpsc::Sender<Envelope>,
    pub sliding_in_tx: watch::Sender<Option<Envelope>>,
    pub out_mult: Mult<Envelope>,
    pub out_pub: TopicPub<Envelope, String>,
    pub sliding_out: watch::Receiver<Option<Envelope>>,
    pub sliding_out_pub: TopicPub<Envelope, String>,
    pub firehose_mult: Mult<Envelope>,
    state_snapshot_fn: Arc<dyn Fn() -> V + Send + Sync>,
    publish: PublishFn,
    ready: Arc<Notify>,
    shutdown_fn: Option<ShutdownFn>,
}

impl<V> ComponentHandle<V> {
    /// Opens the gate between the put-channel and the out-channel and seeds
    /// downstream state views with one snapshot publication (spec.md §4.8).
    /// Every message emitted before this call is retained in the
    /// put-channel (up to its capacity) and delivered, in order, the moment
    /// the gate opens; nothing is lost, and nothing reaches a subscriber
    /// before the component that owns this handle says it's ready.
    pub fn system_ready(&self) {
        self.ready.notify_one();
        (self.publish)();
    }

    /// Reads the current published snapshot synchronously, without going
    /// through a channel.
    #[must_use]
    pub fn read_snapshot(&self) -> V {
        (self.state_snapshot_fn)()
    }

    /// Closes this component's input channels and runs the user-supplied
    /// shutdown closure, if any, to release state-owned resources (spec.md
    /// §3 "Lifecycle"). The handler loops drain whatever is already queued
    /// and then exit; downstream fan-outs close in turn once their sources
    /// do.
    pub fn shutdown(mut self) {
        drop(self.in_tx);
        drop(self.sliding_in_tx);
        if let Some(shutdown) = self.shutdown_fn.take() {
            shutdown();
        }
    }
}

/// Builds and wires a complete component: channels, emit path, state cell,
/// snapshot publisher, change watcher, both handler loops, and the
/// startup-buffering gate. Returns the caller-facing [`ComponentHandle`].
///
/// # Errors
///
/// Returns [`ConfigError`] if any [`BufferSpec`] in `opts` is invalid.
#[allow(clippy::too_many_arguments)]
pub fn build<S, V>(
    cmp_id: ComponentId,
    opts: ComponentOpts,
    state_fn: impl FnOnce(EmitFn) -> (S, Option<ShutdownFn>),
    xform: XformFn<S, V>,
    handlers: HandlerMap<S>,
    unhandled: Option<Arc<dyn Handler<S>>>,
    catch_all: Option<Arc<dyn Handler<S>>>,
    state_pub_handler: Option<Arc<dyn Handler<S>>>,
) -> Result<ComponentHandle<V>, ConfigError>
where
    S: Clone + PartialEq + Send + Sync + 'static,
    V: Clone + Serialize + Send + Sync + 'static,
{
    if cmp_id.0.is_empty() {
        return Err(ConfigError::new("cmp_id must not be empty"));
    }

    // 1. channels
    let (in_tx, in_rx) = build_fifo::<Envelope>(opts.in_chan)?;
    let (sliding_in_tx, sliding_in_rx) = build_sliding::<Envelope>(opts.sliding_in_chan)?;
    let (put_tx, mut put_rx) = build_fifo::<Envelope>(opts.out_chan)?;
    let (tee_mult_tx, tee_mult_rx) = build_fifo::<Envelope>(opts.out_chan)?;
    let (tee_pub_tx, tee_pub_rx) = build_fifo::<Envelope>(opts.out_chan)?;
    let (firehose_tx, firehose_rx) = build_fifo::<Envelope>(opts.firehose_chan)?;
    let (sliding_out_tx, sliding_out_rx) = build_sliding::<Envelope>(opts.sliding_out_chan)?;
    let sliding_out_rx_for_pub = sliding_out_rx.clone();
    let (sliding_out_pub_tx, sliding_out_pub_rx) = build_fifo::<Envelope>(BufferSpec::buffer(8))?;

    // 2. emit
    let emit = EmitFn::new(cmp_id.clone(), put_tx, firehose_tx.clone(), opts.msgs_on_firehose);

    // 3. state, via the user-supplied initializer (spec.md §4.7 step 4)
    let (initial_state, shutdown_fn) = state_fn(emit.clone());
    let state = Arc::new(Watchable::new(initial_state));

    // 4. snapshot publisher
    let publish: PublishFn = build_publisher(
        cmp_id.clone(),
        Arc::clone(&state),
        Arc::clone(&xform),
        sliding_out_tx,
        firehose_tx.clone(),
        opts.snapshots_on_firehose,
    );
    let state_snapshot_fn: Arc<dyn Fn() -> V + Send + Sync> = {
        let state = Arc::clone(&state);
        let xform = Arc::clone(&xform);
        Arc::new(move || xform(&state.read()))
    };

    // 5. out-channel fan-out stages, plus the snapshot topic publisher
    // (spec.md §4.7 step 7's "topic publisher for snapshots on the
    // sliding-out channel"), fed by a task translating the sliding-out
    // `watch` channel's change notifications into the `mpsc` feed `TopicPub`
    // is built over.
    let out_mult = Mult::spawn(tee_mult_rx);
    let out_pub = TopicPub::spawn(tee_pub_rx, |env: &Envelope| env.msg.msg_type.to_string());
    let firehose_mult = Mult::spawn(firehose_rx);
    let sliding_out_pub =
        TopicPub::spawn(sliding_out_pub_rx, |env: &Envelope| env.msg.msg_type.to_string());
    {
        let mut rx = sliding_out_rx_for_pub;
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let value = rx.borrow_and_update().clone();
                if let Some(env) = value {
                    if sliding_out_pub_tx.send(env).await.is_err() {
                        break;
                    }
                }
            }
        });
    }

    // 6. change watcher
    spawn_change_watcher(Arc::clone(&state), Arc::clone(&publish));

    // 7. handler loops (built-ins are inserted without clobbering a
    // caller-supplied override for the same message type)
    let mut handlers = handlers;
    handlers
        .entry(crate::firehose::cmd_get_state())
        .or_insert_with(|| Arc::new(BuiltinGetState { xform }) as Arc<dyn Handler<S>>);
    handlers
        .entry(crate::firehose::cmd_publish_state())
        .or_insert_with(|| Arc::new(BuiltinPublishState) as Arc<dyn Handler<S>>);

    spawn_ordered_loop(
        cmp_id.clone(),
        in_rx,
        Arc::clone(&state),
        emit.clone(),
        Arc::clone(&publish),
        handlers,
        unhandled,
        catch_all,
        ReceiveFirehose {
            msgs_on_firehose: opts.msgs_on_firehose,
            snapshots_on_firehose: opts.snapshots_on_firehose,
            firehose_tx: firehose_tx.clone(),
        },
    );
    spawn_sliding_loop(
        cmp_id.clone(),
        sliding_in_rx,
        |env: Envelope| env,
        state,
        emit,
        Arc::clone(&publish),
        state_pub_handler,
        ReceiveFirehose {
            msgs_on_firehose: opts.msgs_on_firehose,
            snapshots_on_firehose: opts.snapshots_on_firehose,
            firehose_tx,
        },
        opts.throttle_ms,
    );

    // 8. startup-buffering gate: nothing reaches the out-channel's
    // fan-out stages until `system_ready` fires.
    let ready = Arc::new(Notify::new());
    let gate_ready = Arc::clone(&ready);
    tokio::spawn(async move {
        let mut opened = false;
        while let Some(envelope) = put_rx.recv().await {
            if !opened {
                gate_ready.notified().await;
                opened = true;
            }
            if tee_mult_tx.send(envelope.clone()).await.is_err() {
                break;
            }
            if tee_pub_tx.send(envelope).await.is_err() {
                break;
            }
        }
    });

    // 9. freeze and hand back the external interface
    Ok(ComponentHandle {
        cmp_id,
        in_tx,
        sliding_in_tx,
        out_mult,
        out_pub,
        sliding_out: sliding_out_rx,
        sliding_out_pub,
        firehose_mult,
        state_snapshot_fn,
        publish,
        ready,
        shutdown_fn,
    })
}

#[allow(dead_code)]
fn _assert_meta_default_is_usable() -> MsgMeta {
    MsgMeta::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MsgType;
    use std::collections::HashMap;

    #[tokio::test]
    async fn get_state_builtin_replies_with_current_snapshot() {
        let opts = ComponentOpts::default();
        let handle = build::<i32, i32>(
            ComponentId::new("c1"),
            opts,
            |_emit| (7, None),
            crate::snapshot::identity_xform(),
            HashMap::new(),
            None,
            None,
            None,
        )
        .unwrap();
        handle.system_ready();

        let mut out = handle.out_mult.subscribe(4).await;
        handle
            .in_tx
            .send(Envelope {
                msg: Msg::new(crate::firehose::cmd_get_state(), Value::Null),
                meta: MsgMeta::default(),
            })
            .await
            .unwrap();

        let reply = out.recv().await.unwrap();
        assert_eq!(reply.msg.msg_type, crate::firehose::state_snapshot());
        assert_eq!(reply.msg.payload["snapshot"], 7);
    }

    #[tokio::test]
    async fn emits_before_system_ready_are_buffered_in_order() {
        let opts = ComponentOpts::default();
        struct Echo;
        #[async_trait]
        impl Handler<i32> for Echo {
            async fn handle(&self, ctx: &HandlerContext<i32>) {
                ctx.emit.emit(ctx.envelope.msg.clone(), None).await;
            }
        }
        let mut handlers: HandlerMap<i32> = HashMap::new();
        handlers.insert(MsgType::new("ping", "req"), Arc::new(Echo));

        let handle = build::<i32, i32>(
            ComponentId::new("c1"),
            opts,
            |_emit| (0, None),
            crate::snapshot::identity_xform(),
            handlers,
            None,
            None,
            None,
        )
        .unwrap();

        let mut out = handle.out_mult.subscribe(8).await;
        for n in 0..3 {
            handle
                .in_tx
                .send(Envelope {
                    msg: Msg::new(MsgType::new("ping", "req"), serde_json::json!(n)),
                    meta: MsgMeta::default(),
                })
                .await
                .unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(out.try_recv().is_err());

        handle.system_ready();
        for expected in 0..3 {
            let env = out.recv().await.unwrap();
            assert_eq!(env.msg.payload, serde_json::json!(expected));
        }
    }

    #[tokio::test]
    async fn empty_cmp_id_is_a_config_error() {
        let err = build::<i32, i32>(
            ComponentId::new(""),
            ComponentOpts::default(),
            |_emit| (0, None),
            crate::snapshot::identity_xform(),
            HashMap::new(),
            None,
            None,
            None,
        )
        .unwrap_err();
        assert!(err.reason.contains("cmp_id"));
    }

    #[tokio::test]
    async fn shutdown_runs_user_supplied_closure_once() {
        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let ran_inner = Arc::clone(&ran);
        let handle = build::<i32, i32>(
            ComponentId::new("c1"),
            ComponentOpts::default(),
            move |_emit| {
                let shutdown: ShutdownFn = Box::new(move || {
                    ran_inner.store(true, std::sync::atomic::Ordering::SeqCst);
                });
                (0, Some(shutdown))
            },
            crate::snapshot::identity_xform(),
            HashMap::new(),
            None,
            None,
            None,
        )
        .unwrap();

        handle.shutdown();
        assert!(ran.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn publish_state_reaches_sliding_out_with_from_metadata() {
        let handle = build::<i32, i32>(
            ComponentId::new("c1"),
            ComponentOpts::default(),
            |_emit| (9, None),
            crate::snapshot::identity_xform(),
            HashMap::new(),
            None,
            None,
            None,
        )
        .unwrap();
        handle.system_ready();

        let mut sliding_out = handle.sliding_out.clone();
        sliding_out.changed().await.unwrap();
        handle
            .in_tx
            .send(Envelope {
                msg: Msg::new(crate::firehose::cmd_publish_state(), Value::Null),
                meta: MsgMeta::default(),
            })
            .await
            .unwrap();

        sliding_out.changed().await.unwrap();
        let env = sliding_out.borrow().clone().unwrap();
        assert_eq!(env.msg.msg_type, crate::firehose::app_state());
        assert_eq!(env.msg.payload, serde_json::json!(9));
        assert_eq!(env.meta.from, Some(ComponentId::new("c1")));
    }
}
