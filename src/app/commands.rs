//! Inbound commands to the treatment worker.
//!
//! These represent actions requested by the foreground (console, UI) that
//! the sequencer applies to the [`Controller`](super::controller::Controller)
//! in FIFO order.

use std::time::Duration;

use crate::dose::PowerMode;
use crate::error::{Error, Result};

use super::parameters;

/// Commands that the foreground can enqueue.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    /// Connect to the instruments.
    Open,
    /// Stop any treatment and release the instruments.
    Close,
    /// Begin the sweep at the first frequency.
    Start,
    /// Disable output, keeping elapsed time.
    Pause,
    /// Re-enable output, continuing the elapsed time.
    Resume,
    /// Disable output and zero elapsed time.
    Stop,
    /// Rewind the sweep to the first frequency.
    Reset,
    /// One-shot: treat the current frequency for the full duration.
    Treat,
    /// Leave the worker loop.
    Kill,

    // -- Parameter setters --
    SetFrequencies(Vec<u32>),
    SetPowerMode(PowerMode),
    SetPowerValue(f64),
    /// Store the power value and reprogram the source immediately.
    SetPressure(f64),
    SetBurstLength(f64),
    SetDutyCycle(f64),
    SetDuration(Duration),
    SetSimulate(bool),
}

impl ControlCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Close => "CLOSE",
            Self::Start => "START",
            Self::Pause => "PAUSE",
            Self::Resume => "RESUME",
            Self::Stop => "STOP",
            Self::Reset => "RESET",
            Self::Treat => "TREAT",
            Self::Kill => "KILL",
            Self::SetFrequencies(_) => "SET_FREQUENCIES",
            Self::SetPowerMode(_) => "SET_POWER_MODE",
            Self::SetPowerValue(_) => "SET_POWER_VALUE",
            Self::SetPressure(_) => "SET_PRESSURE",
            Self::SetBurstLength(_) => "SET_BURST_LENGTH",
            Self::SetDutyCycle(_) => "SET_DUTY_CYCLE",
            Self::SetDuration(_) => "SET_DURATION",
            Self::SetSimulate(_) => "SET_SIMULATE",
        }
    }

    /// Checks that need no controller state, run before enqueueing.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::SetFrequencies(f) => parameters::validate_frequencies(f),
            Self::SetPowerValue(v) | Self::SetPressure(v) => {
                if v.is_finite() && *v >= 0.0 {
                    Ok(())
                } else {
                    Err(Error::InvalidConfiguration(format!(
                        "power value {v} must be a non-negative number"
                    )))
                }
            }
            Self::SetBurstLength(s) => parameters::validate_burst_length(*s),
            Self::SetDutyCycle(d) => parameters::validate_duty_cycle(*d),
            Self::SetDuration(d) => parameters::validate_duration(*d),
            _ => Ok(()),
        }
    }
}
