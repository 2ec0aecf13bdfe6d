//! Outbound controller events.
//!
//! The sequencer emits these through the
//! [`Notifier`](super::ports::Notifier) port.  Adapters on the other side
//! decide what to do with them: log them, drive a console, forward them to
//! callbacks.

use core::fmt;
use std::time::Duration;

use crate::error::Error;
use crate::fsm::StateId;

/// Hardware connection state owned by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
    /// The handshake failed and simulation was declined.  Cleared only by
    /// close/reopen.
    ConnectedWithError,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connected => write!(f, "connected"),
            Self::ConnectedWithError => write!(f, "connected (error)"),
        }
    }
}

/// Point-in-time view of the controller and sequencer.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerStatus {
    pub connection: ConnectionState,
    pub simulate: bool,
    pub ready: bool,
    pub treating: bool,
    pub frequency_khz: Option<u32>,
    pub voltage_vpp: f64,
    pub sequence: StateId,
    pub frequency_index: usize,
    pub elapsed: Duration,
    /// Dose-warning bitmask for the active frequency.
    pub warnings: u8,
}

impl Default for ControllerStatus {
    fn default() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            simulate: false,
            ready: false,
            treating: false,
            frequency_khz: None,
            voltage_vpp: 0.0,
            sequence: StateId::Idle,
            frequency_index: 0,
            elapsed: Duration::ZERO,
            warnings: 0,
        }
    }
}

/// Structured events emitted by the treatment worker.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    /// OPEN completed (possibly in simulation or with a connection error).
    Opened(ControllerStatus),

    /// The sweep started treating the frequency at `index`.
    Treating { index: usize, frequency_khz: u32 },

    /// Periodic progress while a frequency is treating or paused.
    Waiting { elapsed: Duration, duration: Duration },

    /// The sweep finished.
    Ended(String),

    /// The worker shut down and released the hardware.
    Closed,

    /// A fault reached the top of the worker.
    Error(Error),
}
