//! spec.md §8 scenario 4: under a burst of 100 messages on the sliding
//! in-channel faster than `throttle_ms`, handler invocations stay bounded
//! and the final message sent is always among those observed.

use async_trait::async_trait;
use cmp_runtime::component::{self, ComponentOpts};
use cmp_runtime::handler::{Handler, HandlerContext, HandlerMap};
use cmp_runtime::message::{ComponentId, Envelope, Msg, MsgMeta, MsgType};
use cmp_runtime::snapshot::identity_xform;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct RecordLast {
    count: Arc<AtomicUsize>,
    last_seen: Arc<AtomicUsize>,
}

#[async_trait]
impl Handler<()> for RecordLast {
    async fn handle(&self, ctx: &HandlerContext<()>) {
        self.count.fetch_add(1, Ordering::SeqCst);
        let n = ctx.payload()["n"].as_u64().unwrap() as usize;
        self.last_seen.store(n, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn sliding_burst_is_throttled_and_keeps_the_last_message() {
    let count = Arc::new(AtomicUsize::new(0));
    let last_seen = Arc::new(AtomicUsize::new(0));

    // spec.md §4.4's sliding-input path invokes the designated
    // state-snapshot handler, not the ordered handler map — so this is
    // wired as `state_pub_handler`, not `handlers`.
    let handlers: HandlerMap<()> = HandlerMap::new();
    let state_pub_handler: Arc<dyn Handler<()>> = Arc::new(RecordLast {
        count: Arc::clone(&count),
        last_seen: Arc::clone(&last_seen),
    });

    let mut opts = ComponentOpts::default();
    opts.throttle_ms = 10;

    let handle = component::build::<(), ()>(
        ComponentId::new("c1"),
        opts,
        |_emit| ((), None),
        identity_xform(),
        handlers,
        None,
        None,
        Some(state_pub_handler),
    )
    .unwrap();
    handle.system_ready();

    for n in 0..100 {
        handle
            .sliding_in_tx
            .send(Some(Envelope {
                msg: Msg::new(MsgType::new("pointer", "move"), serde_json::json!({ "n": n })),
                meta: MsgMeta::default(),
            }))
            .unwrap();
    }

    tokio::time::sleep(std::time::Duration::from_millis(150)).await;

    assert!(count.load(Ordering::SeqCst) <= 20, "invocations stayed bounded");
    assert_eq!(last_seen.load(Ordering::SeqCst), 99, "last message sent was observed");
}
