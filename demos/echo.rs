//! A single component that answers every `ping/req` with a `pong/res`
//! carrying the same payload, mirroring spec.md §8 scenario 1. Run with
//! `cargo run --example echo`.

use async_trait::async_trait;
use cmp_runtime::component::{self, ComponentOpts};
use cmp_runtime::handler::{Handler, HandlerContext, HandlerMap};
use cmp_runtime::message::{ComponentId, Envelope, Msg, MsgMeta, MsgType};
use cmp_runtime::snapshot::identity_xform;
use std::sync::Arc;

struct Echo;

#[async_trait]
impl Handler<()> for Echo {
    async fn handle(&self, ctx: &HandlerContext<()>) {
        let reply = Msg::new(MsgType::new("pong", "res"), ctx.payload().clone());
        ctx.emit.emit(reply, None).await;
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let mut handlers: HandlerMap<()> = HandlerMap::new();
    handlers.insert(MsgType::new("ping", "req"), Arc::new(Echo));

    let handle = component::build::<(), ()>(
        ComponentId::new("echo"),
        ComponentOpts::default(),
        |_emit| ((), None),
        identity_xform(),
        handlers,
        None,
        None,
        None,
    )
    .expect("valid component config");

    let mut out = handle.out_mult.subscribe(8).await;
    handle.system_ready();

    for n in 0..2 {
        handle
            .in_tx
            .send(Envelope {
                msg: Msg::new(MsgType::new("ping", "req"), serde_json::json!({ "n": n })),
                meta: MsgMeta::default(),
            })
            .await
            .expect("in-channel accepts the send");
    }

    for _ in 0..2 {
        let env = out.recv().await.expect("out-channel yields a reply");
        tracing::info!(?env, "received reply");
        println!("{env}");
    }
}
