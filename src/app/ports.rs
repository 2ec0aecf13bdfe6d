//! Port traits: the hexagonal boundary between treatment logic and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Controller / Sequencer (domain)
//! ```
//!
//! Instrument adapters (signal source, RF switches), the time source, the
//! notification sink and the simulation-fallback policy implement these
//! traits.  The [`Controller`](super::controller::Controller) owns them as
//! boxed trait objects so the whole bundle can move onto the worker thread;
//! every port is therefore `Send`.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::waveform::{BurstSettings, BurstUpdate, WaveformSettings};

use super::events::ControlEvent;

// ───────────────────────────────────────────────────────────────
// Signal source (driven adapter: domain → function generator)
// ───────────────────────────────────────────────────────────────

/// The transmit channel of a function generator.
///
/// Implementations own the connection lifecycle of one device.  Voltage
/// ceilings are enforced above this trait by
/// [`TransmitChannel`](super::transmit::TransmitChannel).
pub trait SignalSource: Send {
    fn open(&mut self) -> Result<()>;

    /// Disable every output and release the device.
    fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    fn apply_waveform(&mut self, settings: &WaveformSettings) -> Result<()>;

    fn set_burst(&mut self, update: &BurstUpdate) -> Result<()>;

    fn set_output_enabled(&mut self, enabled: bool) -> Result<()>;

    fn set_frequency(&mut self, frequency_hz: f64) -> Result<()>;

    /// Program the amplitude (Vpp).
    fn set_voltage(&mut self, amplitude_vpp: f64) -> Result<()>;

    fn settings(&mut self) -> Result<WaveformSettings>;

    fn burst(&mut self) -> Result<BurstSettings>;
}

// ───────────────────────────────────────────────────────────────
// Routing switch (driven adapter: domain → RF switch)
// ───────────────────────────────────────────────────────────────

/// A single-pole multi-throw RF switch.
pub trait RoutingSwitch: Send {
    /// Connect, discovering the device first when no port was given.
    fn open(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Select a throw and verify it by read-back.
    fn set_position(&mut self, position: u8) -> Result<()>;

    fn position(&mut self) -> Result<u8>;

    /// Human-readable device label for logs.
    fn label(&self) -> String;
}

// ───────────────────────────────────────────────────────────────
// Clock (driven adapter: domain ← monotonic time)
// ───────────────────────────────────────────────────────────────

/// Monotonic time source used for treatment timing.
pub trait Clock: Send {
    /// Time since an arbitrary fixed epoch.
    fn now(&self) -> Duration;

    /// Block the calling thread.
    fn sleep(&self, duration: Duration);
}

// ───────────────────────────────────────────────────────────────
// Notifier (driven adapter: domain → operator interface)
// ───────────────────────────────────────────────────────────────

/// The worker emits [`ControlEvent`]s through this port, synchronously on
/// its own thread.
pub trait Notifier: Send {
    fn notify(&mut self, event: &ControlEvent);
}

// ───────────────────────────────────────────────────────────────
// Simulation fallback (driven adapter: domain → operator decision)
// ───────────────────────────────────────────────────────────────

/// Asked once when the hardware handshake fails to connect.
///
/// Returning `true` switches the controller to simulation; `false` leaves it
/// connected-with-error until the next close/reopen.
pub trait SimulationFallback: Send {
    fn offer_simulation(&mut self, error: &Error) -> bool;
}

/// Never fall back to simulation.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclineSimulation;

impl SimulationFallback for DeclineSimulation {
    fn offer_simulation(&mut self, _error: &Error) -> bool {
        false
    }
}

/// Always fall back to simulation.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptSimulation;

impl SimulationFallback for AcceptSimulation {
    fn offer_simulation(&mut self, _error: &Error) -> bool {
        true
    }
}
