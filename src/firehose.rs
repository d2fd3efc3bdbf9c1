//! Reserved `MsgType` constants and the observability envelopes wrapped
//! around ordinary messages. The `firehose` namespace is reserved: user
//! message types must never use it (spec.md §6).

use crate::message::{msg_type, MsgType};

/// In: request a state snapshot; answered by `STATE_SNAPSHOT`.
#[must_use]
pub fn cmd_get_state() -> MsgType {
    msg_type("cmd/get-state")
}

/// In: trigger a snapshot publication on the sliding-out channel.
#[must_use]
pub fn cmd_publish_state() -> MsgType {
    msg_type("cmd/publish-state")
}

/// Out: `{cmp_id, snapshot}`, the reply to `cmd/get-state`.
#[must_use]
pub fn state_snapshot() -> MsgType {
    msg_type("state/snapshot")
}

/// Sliding-out: `snapshot`, metadata carries `from: cmp_id`.
#[must_use]
pub fn app_state() -> MsgType {
    msg_type("app-state")
}

/// Firehose: a message received on the ordered in-channel.
#[must_use]
pub fn cmp_recv() -> MsgType {
    msg_type("firehose/cmp-recv")
}

/// Firehose: a message received on the sliding in-channel.
#[must_use]
pub fn cmp_recv_state() -> MsgType {
    msg_type("firehose/cmp-recv-state")
}

/// Firehose: a message this component emitted.
#[must_use]
pub fn cmp_put() -> MsgType {
    msg_type("firehose/cmp-put")
}

/// Firehose: a state snapshot this component published.
#[must_use]
pub fn cmp_publish_state() -> MsgType {
    msg_type("firehose/cmp-publish-state")
}
