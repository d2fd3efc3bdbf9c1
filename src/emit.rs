//! The emit function (`put-fn`, spec.md §4.3): the sole means by which
//! handlers produce output. Bound per component, it rewrites metadata,
//! delivers to the internal put-channel, and mirrors activity onto the
//! firehose channel when configured to.

use crate::firehose::cmp_put;
use crate::message::{append_cmp_seq, fresh_id, now_millis, ComponentId, Direction, Envelope, Msg};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::error;
use uuid::Uuid;

/// A cloneable handle to the component's single emit path. Handlers never
/// touch the put-channel or firehose channel directly; they call
/// [`EmitFn::emit`].
#[derive(Clone)]
pub struct EmitFn {
    cmp_id: ComponentId,
    put_tx: mpsc::Sender<Envelope>,
    firehose_tx: mpsc::Sender<Envelope>,
    msgs_on_firehose: bool,
}

impl EmitFn {
    #[must_use]
    pub fn new(
        cmp_id: ComponentId,
        put_tx: mpsc::Sender<Envelope>,
        firehose_tx: mpsc::Sender<Envelope>,
        msgs_on_firehose: bool,
    ) -> Self {
        Self {
            cmp_id,
            put_tx,
            firehose_tx,
            msgs_on_firehose,
        }
    }

    /// Emits `msg`. `caller_tag`, if given, is honoured as the envelope's
    /// `tag` when the message doesn't already carry one; every other piece
    /// of metadata is rewritten here regardless of what the caller passed
    /// in (spec.md §4.3: "only `tag` is honoured").
    pub async fn emit(&self, msg: Msg, caller_tag: Option<Uuid>) {
        let mut meta = crate::message::MsgMeta {
            tag: caller_tag,
            ..Default::default()
        };
        append_cmp_seq(&mut meta, &self.cmp_id, Direction::Out);
        let ts = now_millis();
        meta.timings
            .entry(self.cmp_id.clone())
            .or_default()
            .out_ts = Some(ts);
        meta.corr_id = Some(fresh_id());
        if meta.tag.is_none() {
            meta.tag = Some(fresh_id());
        }

        let envelope = Envelope {
            msg: msg.clone(),
            meta: meta.clone(),
        };

        if self.msgs_on_firehose {
            if msg.msg_type.is_firehose() {
                let _ = self.firehose_tx.send(envelope.clone()).await;
            } else {
                let firehose_envelope = Envelope {
                    msg: Msg::new(
                        cmp_put(),
                        json!({
                            "cmp_id": self.cmp_id.0,
                            "msg": msg,
                            "msg_meta": meta,
                            "ts": ts,
                        }),
                    ),
                    meta: crate::message::MsgMeta::default(),
                };
                let _ = self.firehose_tx.send(firehose_envelope).await;
            }
        }

        if self.put_tx.send(envelope).await.is_err() {
            error!(cmp_id = %self.cmp_id, msg = %msg, "emit on shut-down component, dropping message");
        }
    }

    /// Direct access to the firehose sender, bypassing `msgs_on_firehose`.
    /// Relay components use this to forward a received `firehose/*`
    /// message onto the firehose channel verbatim even when they are
    /// configured with `msgs_on_firehose=false` (spec.md §5's relay-loop
    /// guidance and §8 scenario 6) — `emit` itself must stay gated by the
    /// flag so a relay's own ordinary emissions never get wrapped and fed
    /// back into the firehose it is relaying.
    pub async fn forward_to_firehose(&self, envelope: Envelope) {
        let _ = self.firehose_tx.send(envelope).await;
    }

    #[must_use]
    pub fn cmp_id(&self) -> &ComponentId {
        &self.cmp_id
    }
}
