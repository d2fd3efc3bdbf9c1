//! Channel factory. FIFO buffers preserve order and block the producer at
//! capacity; sliding buffers retain only the latest value and never block
//! the producer. An unknown buffer spec is a configuration error and must
//! abort construction (spec.md §4.1).

use crate::error::ConfigError;
use tokio::sync::{mpsc, watch};

/// A buffer spec, the tagged pair from spec.md §3's options table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferSpec {
    /// Bounded FIFO of depth `n`. The producer suspends when full.
    Buffer(usize),
    /// Latest-only buffer. `n` is accepted for parity with the spec's
    /// tagged pair but is not otherwise meaningful here: a `watch` channel
    /// always retains exactly the most recent value, which is what every
    /// default (`n = 1`) and every caller observed in practice needs. See
    /// DESIGN.md for the rationale.
    Sliding(usize),
}

impl BufferSpec {
    #[must_use]
    pub const fn buffer(n: usize) -> Self {
        Self::Buffer(n)
    }

    #[must_use]
    pub const fn sliding(n: usize) -> Self {
        Self::Sliding(n)
    }

    /// Validates the depth is non-zero; zero-depth FIFO channels can never
    /// admit a producer and are a configuration mistake, not a legal edge
    /// case.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the spec names a zero-depth FIFO
    /// buffer.
    pub fn validate(self) -> Result<Self, ConfigError> {
        match self {
            Self::Buffer(0) => Err(ConfigError::new("buffer depth must be at least 1")),
            other => Ok(other),
        }
    }
}

/// Builds a bounded FIFO channel from a buffer spec.
///
/// # Errors
///
/// Returns [`ConfigError`] if `spec` is not a `Buffer` spec.
pub fn build_fifo<T>(spec: BufferSpec) -> Result<(mpsc::Sender<T>, mpsc::Receiver<T>), ConfigError> {
    match spec.validate()? {
        BufferSpec::Buffer(n) => Ok(mpsc::channel(n)),
        BufferSpec::Sliding(_) => Err(ConfigError::new(
            "expected a buffer spec, got a sliding spec",
        )),
    }
}

/// Builds a latest-only channel from a buffer spec. The initial value is
/// `None` until the first send.
///
/// # Errors
///
/// Returns [`ConfigError`] if `spec` is not a `Sliding` spec.
pub fn build_sliding<T: Clone>(
    spec: BufferSpec,
) -> Result<(watch::Sender<Option<T>>, watch::Receiver<Option<T>>), ConfigError> {
    match spec {
        BufferSpec::Sliding(_) => Ok(watch::channel(None)),
        BufferSpec::Buffer(_) => Err(ConfigError::new(
            "expected a sliding spec, got a buffer spec",
        )),
    }
}
