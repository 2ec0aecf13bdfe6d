//! Unified error types for the treatment controller.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! worker's top-level fault handling uniform.  Variants carry owned strings
//! rather than source errors so they are `Clone` and can travel inside
//! [`ControlEvent::Error`](crate::app::events::ControlEvent::Error).

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level controller error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Hardware interaction attempted while disconnected, with no
    /// frequencies selected, or after a failed connection.
    #[error("controller not ready")]
    NotReady,

    /// Auto-discovery found no device matching the filter.
    #[error("no device matching {0}")]
    DeviceNotFound(String),

    /// Auto-discovery found more than one device matching the filter.
    #[error("found {count} devices matching {filter}")]
    AmbiguousDevice { filter: String, count: usize },

    /// A read-back after a write did not match the requested value.
    #[error("{device} read back {actual}, expected {expected}")]
    Verification {
        device: String,
        expected: String,
        actual: String,
    },

    /// A requested output exceeds a hard safety ceiling.
    #[error("requested {quantity} {requested} exceeds limit {limit}")]
    SafetyLimitExceeded {
        quantity: &'static str,
        requested: f64,
        limit: f64,
    },

    /// The dose model has no physical solution for the request.
    #[error("no solution: {0}")]
    Domain(String),

    /// Configuration or parameter value is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A frequency was transmitted that has no calibration entry.
    #[error("no calibration entry for {0} kHz")]
    MissingCalibration(u32),

    /// The command queue has no live worker.
    #[error("control worker not running")]
    NotRunning,

    /// The bounded command channel is full.
    #[error("command queue full")]
    QueueFull,

    /// Transport-level failure talking to an instrument.
    #[error("instrument I/O: {0}")]
    Io(String),

    /// An instrument answered with something that could not be parsed.
    #[error("instrument protocol: {0}")]
    Protocol(String),

    /// The worker caught a panic raised inside adapter code.
    #[error("worker fault: {0}")]
    WorkerFault(String),
}

impl Error {
    /// Failures that mean an instrument could not be reached at all.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::DeviceNotFound(_) | Self::AmbiguousDevice { .. } | Self::Io(_)
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serialport::Error> for Error {
    fn from(e: serialport::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidConfiguration(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
