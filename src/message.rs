//! The wire-shaped message (`Msg`), its out-of-band metadata (`MsgMeta`),
//! and the envelope that actually travels on a channel (`Envelope`).
//!
//! Metadata is never inlined into the payload: `cmp_seq` tracks the path a
//! message has traversed, `corr_id` is unique per emit, `tag` is stable
//! across a logical message's forwarding chain, and `timings` accumulates a
//! `{in_ts, out_ts}` pair per component the message has passed through.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// A stable string identity for a component. Newtype rather than a bare
/// `String` because both `cmp_seq` and the handler registry key off it and
/// ought not be confused with arbitrary path-like strings elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentId(pub String);

impl ComponentId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ComponentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A namespaced symbolic tag, `domain/name`. Message dispatch is keyed on
/// this, never on a Rust enum variant, since the handler registry is built
/// once at construction from a caller-supplied `(MsgType, Handler)` map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MsgType {
    pub domain: String,
    pub name: String,
}

impl MsgType {
    #[must_use]
    pub fn new(domain: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            name: name.into(),
        }
    }

    /// `domain/name` belongs to the reserved `firehose` namespace.
    #[must_use]
    pub fn is_firehose(&self) -> bool {
        self.domain == "firehose"
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.name)
    }
}

/// Build a `MsgType` from a literal `"domain/name"` string. Used for the
/// reserved constants in `firehose.rs`; not meant for untrusted input.
#[must_use]
pub fn msg_type(spec: &str) -> MsgType {
    match spec.split_once('/') {
        Some((domain, name)) => MsgType::new(domain, name),
        None => MsgType::new(spec, ""),
    }
}

/// The `(type, payload)` pair. `payload` is `serde_json::Value` rather than
/// a generic type parameter: within a process it is already the opaque
/// value the spec calls for, and it is the same representation required at
/// a transport boundary, so there is no separate in-process/wire split to
/// maintain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Msg {
    pub msg_type: MsgType,
    pub payload: serde_json::Value,
}

impl Msg {
    #[must_use]
    pub fn new(msg_type: MsgType, payload: serde_json::Value) -> Self {
        Self { msg_type, payload }
    }
}

impl fmt::Display for Msg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{} {}]", self.msg_type, self.payload)
    }
}

impl Default for Msg {
    fn default() -> Self {
        Self {
            msg_type: MsgType::new("", ""),
            payload: serde_json::Value::Null,
        }
    }
}

/// Per-component `{in_ts, out_ts}` stamps, wall-clock milliseconds since the
/// epoch. Not required to be monotonic (spec: timestamps are observational,
/// not a logical clock).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TimingStamp {
    pub in_ts: Option<i64>,
    pub out_ts: Option<i64>,
}

/// Out-of-band metadata attached to every `Msg`, never merged into its
/// payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MsgMeta {
    pub cmp_seq: Vec<ComponentId>,
    pub corr_id: Option<Uuid>,
    pub tag: Option<Uuid>,
    pub timings: HashMap<ComponentId, TimingStamp>,
    pub from: Option<ComponentId>,
}

/// The unit that actually travels on a channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Envelope {
    pub msg: Msg,
    pub meta: MsgMeta,
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "env: {} tag={:?}", self.msg, self.meta.tag)
    }
}

/// Direction a message is traveling when its `cmp_seq` is updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

/// Appends `cmp_id` to `cmp_seq` if either the sequence is empty or the
/// direction is `In`; on `Out` with a non-empty sequence the sequence is
/// left unchanged (forwarding an already-sequenced message back out does
/// not re-append). Never produces two consecutive equal entries.
pub fn append_cmp_seq(meta: &mut MsgMeta, cmp_id: &ComponentId, direction: Direction) {
    let should_append = meta.cmp_seq.is_empty() || direction == Direction::In;
    if !should_append {
        return;
    }
    if meta.cmp_seq.last() == Some(cmp_id) {
        return;
    }
    meta.cmp_seq.push(cmp_id.clone());
}

/// 128-bit random identifier with negligible collision probability.
#[must_use]
pub fn fresh_id() -> Uuid {
    Uuid::new_v4()
}

/// Wall-clock milliseconds since the epoch.
#[must_use]
pub fn now_millis() -> i64 {
    let now = OffsetDateTime::now_utc();
    now.unix_timestamp() * 1000 + i64::from(now.millisecond())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_in_always_appends_unless_duplicate() {
        let mut meta = MsgMeta::default();
        let a = ComponentId::new("a");
        append_cmp_seq(&mut meta, &a, Direction::In);
        append_cmp_seq(&mut meta, &a, Direction::In);
        assert_eq!(meta.cmp_seq, vec![a]);
    }

    #[test]
    fn append_out_only_when_empty() {
        let mut meta = MsgMeta::default();
        let a = ComponentId::new("a");
        let b = ComponentId::new("b");
        append_cmp_seq(&mut meta, &a, Direction::Out);
        assert_eq!(meta.cmp_seq, vec![a.clone()]);
        append_cmp_seq(&mut meta, &b, Direction::Out);
        assert_eq!(meta.cmp_seq, vec![a]);
    }

    #[test]
    fn display_round_trips_domain_and_name() {
        let mt = MsgType::new("ping", "req");
        assert_eq!(mt.to_string(), "ping/req");
        assert!(!mt.is_firehose());
        assert!(msg_type("firehose/cmp-put").is_firehose());
    }
}
