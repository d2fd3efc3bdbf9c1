//! Construction-time failures. Handler and emit failures are never surfaced
//! here — they are logged in place and the runtime keeps running (see
//! `handler.rs` and `emit.rs`).

use std::fmt;

/// Returned when a component cannot be constructed: an unknown buffer spec,
/// a missing or empty `cmp_id`, or any other mistake that must abort
/// construction rather than limp along.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub reason: String,
}

impl ConfigError {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "configuration error: {}", self.reason)
    }
}

impl std::error::Error for ConfigError {}
