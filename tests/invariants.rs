//! spec.md §8 invariants not already covered by a named end-to-end
//! scenario: `cmp_seq` bookkeeping on inbound reception, and a panicking
//! handler never blocking the next message.

use async_trait::async_trait;
use cmp_runtime::component::{self, ComponentOpts};
use cmp_runtime::handler::{Handler, HandlerContext, HandlerMap};
use cmp_runtime::message::{ComponentId, Envelope, Msg, MsgMeta, MsgType};
use cmp_runtime::snapshot::identity_xform;
use std::sync::Arc;

struct RecordSeq {
    out_tx: tokio::sync::mpsc::Sender<Vec<ComponentId>>,
}

#[async_trait]
impl Handler<()> for RecordSeq {
    async fn handle(&self, ctx: &HandlerContext<()>) {
        let _ = self.out_tx.send(ctx.envelope.meta.cmp_seq.clone()).await;
    }
}

#[tokio::test]
async fn inbound_cmp_seq_gets_cmp_id_appended_exactly_once() {
    let (seq_tx, mut seq_rx) = tokio::sync::mpsc::channel(4);
    let mut handlers: HandlerMap<()> = HandlerMap::new();
    handlers.insert(MsgType::new("ping", "req"), Arc::new(RecordSeq { out_tx: seq_tx }));

    let handle = component::build::<(), ()>(
        ComponentId::new("c1"),
        ComponentOpts::default(),
        |_emit| ((), None),
        identity_xform(),
        handlers,
        None,
        None,
        None,
    )
    .unwrap();
    handle.system_ready();

    handle
        .in_tx
        .send(Envelope {
            msg: Msg::new(MsgType::new("ping", "req"), serde_json::Value::Null),
            meta: MsgMeta {
                cmp_seq: vec![ComponentId::new("c1")],
                ..Default::default()
            },
        })
        .await
        .unwrap();

    let seq = seq_rx.recv().await.unwrap();
    assert_eq!(seq, vec![ComponentId::new("c1")], "no consecutive duplicate");

    handle
        .in_tx
        .send(Envelope {
            msg: Msg::new(MsgType::new("ping", "req"), serde_json::Value::Null),
            meta: MsgMeta::default(),
        })
        .await
        .unwrap();
    let seq = seq_rx.recv().await.unwrap();
    assert_eq!(seq, vec![ComponentId::new("c1")], "appended to an empty sequence");
}

struct Panics;

#[async_trait]
impl Handler<()> for Panics {
    async fn handle(&self, _ctx: &HandlerContext<()>) {
        panic!("boom");
    }
}

struct Echo;

#[async_trait]
impl Handler<()> for Echo {
    async fn handle(&self, ctx: &HandlerContext<()>) {
        ctx.emit.emit(ctx.envelope.msg.clone(), None).await;
    }
}

#[tokio::test]
async fn handler_panic_does_not_block_the_next_message() {
    let mut handlers: HandlerMap<()> = HandlerMap::new();
    handlers.insert(MsgType::new("boom", "req"), Arc::new(Panics));
    handlers.insert(MsgType::new("ping", "req"), Arc::new(Echo));

    let handle = component::build::<(), ()>(
        ComponentId::new("c1"),
        ComponentOpts::default(),
        |_emit| ((), None),
        identity_xform(),
        handlers,
        None,
        None,
        None,
    )
    .unwrap();

    let mut out = handle.out_mult.subscribe(8).await;
    handle.system_ready();

    handle
        .in_tx
        .send(Envelope {
            msg: Msg::new(MsgType::new("boom", "req"), serde_json::Value::Null),
            meta: MsgMeta::default(),
        })
        .await
        .unwrap();
    handle
        .in_tx
        .send(Envelope {
            msg: Msg::new(MsgType::new("ping", "req"), serde_json::json!({ "ok": true })),
            meta: MsgMeta::default(),
        })
        .await
        .unwrap();

    let reply = out.recv().await.unwrap();
    assert_eq!(reply.msg.msg_type, MsgType::new("ping", "req"));
    assert_eq!(reply.msg.payload, serde_json::json!({ "ok": true }));
}
