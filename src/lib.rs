//! Core runtime for message-passing components.
//!
//! A component is an addressable unit, identified by a stable [`ComponentId`],
//! that owns private mutable state and reacts to messages dispatched from a
//! handler registry. It communicates exclusively through typed messages on
//! four channels plus a secondary observability stream (the "firehose") that
//! mirrors everything the component sends, receives, or publishes as state.
//!
//! This crate builds and runs one component at a time. Wiring many
//! components' channels together into a running topology — the
//! "switchboard" — and concrete I/O components (network transports,
//! loggers) are collaborators, not part of this crate.
//!
//! # Module map
//!
//! - [`message`] — `Msg`, `MsgType`, `MsgMeta`, `Envelope`, and the metadata
//!   utilities (`cmp_seq` bookkeeping, fresh ids, timestamps).
//! - [`channels`] — the buffer-spec-driven channel factory.
//! - [`error`] — `ConfigError`, the one error kind that aborts construction.
//! - [`emit`] — `EmitFn`, the sole means by which a handler produces output.
//! - [`state`] — `Watchable<S>`, the watched state cell.
//! - [`snapshot`] — the snapshot publisher and the automatic change watcher.
//! - [`mult`] / [`topic_pub`] — the fan-out primitives the component's
//!   out-channel and firehose are built on.
//! - [`handler`] — the handler-dispatch context and the two input-channel
//!   loops.
//! - [`firehose`] — the reserved `MsgType` constants for the observability
//!   protocol.
//! - [`component`] — the factory that wires all of the above into a running
//!   [`component::ComponentHandle`].
pub mod channels;
pub mod component;
pub mod emit;
pub mod error;
pub mod firehose;
pub mod handler;
pub mod message;
pub mod mult;
pub mod snapshot;
pub mod state;
pub mod topic_pub;
