//! Dose safety envelope.
//!
//! Two kinds of limit live here:
//!
//! 1. **Hard ceilings**: the source voltage may never exceed the configured
//!    maximum.  [`check_voltage`] rejects a request before anything is
//!    written to the instrument.
//! 2. **Warning thresholds**: MI, ISPPA, ISPTA and input voltage are
//!    compared against fixed limits.  Crossing one annotates the dose with a
//!    [`DoseWarning`] bit; it never stops a treatment.
//!
//! [`SafetyMonitor`] latches the warning bitmask for the active frequency
//! and logs each bit as it is set or cleared.

use core::fmt;

use log::{info, warn};

use crate::dose::FrequencyDose;
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Thresholds (fixed, not operator-configurable)
// ---------------------------------------------------------------------------

/// Mechanical index above which the dose is flagged.
pub const MI_WARNING_LIMIT: f64 = 1.91;
/// ISPPA (W/cm²) above which the dose is flagged.
pub const ISPPA_WARNING_LIMIT: f64 = 190.1;
/// ISPTA (mW/cm²) above which the dose is flagged.
pub const ISPTA_WARNING_LIMIT: f64 = 720.1;
/// Source voltage (Vpp) above which the dose is flagged.
pub const INPUT_VOLTAGE_WARNING_LIMIT: f64 = 1.01;

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// A dose metric above its warning threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DoseWarning {
    MechanicalIndex = 0b0000_0001,
    Isppa = 0b0000_0010,
    Ispta = 0b0000_0100,
    InputVoltage = 0b0000_1000,
}

impl DoseWarning {
    pub const ALL: [DoseWarning; 4] = [
        DoseWarning::MechanicalIndex,
        DoseWarning::Isppa,
        DoseWarning::Ispta,
        DoseWarning::InputVoltage,
    ];

    /// Return the bitmask for this warning.
    pub const fn mask(self) -> u8 {
        self as u8
    }

    /// Decode every warning set in `flags`.
    pub fn from_flags(flags: u8) -> impl Iterator<Item = DoseWarning> {
        Self::ALL.into_iter().filter(move |w| flags & w.mask() != 0)
    }
}

impl fmt::Display for DoseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MechanicalIndex => write!(f, "MI > {MI_WARNING_LIMIT}"),
            Self::Isppa => write!(f, "ISPPA > {ISPPA_WARNING_LIMIT} W/cm2"),
            Self::Ispta => write!(f, "ISPTA > {ISPTA_WARNING_LIMIT} mW/cm2"),
            Self::InputVoltage => write!(f, "input > {INPUT_VOLTAGE_WARNING_LIMIT} V"),
        }
    }
}

/// Warning bitmask for a computed dose.
pub fn dose_warnings(dose: &FrequencyDose) -> u8 {
    let mut flags = 0;
    if dose.mechanical_index > MI_WARNING_LIMIT {
        flags |= DoseWarning::MechanicalIndex.mask();
    }
    if dose.isppa > ISPPA_WARNING_LIMIT {
        flags |= DoseWarning::Isppa.mask();
    }
    if dose.ispta > ISPTA_WARNING_LIMIT {
        flags |= DoseWarning::Ispta.mask();
    }
    if dose.input_voltage > INPUT_VOLTAGE_WARNING_LIMIT {
        flags |= DoseWarning::InputVoltage.mask();
    }
    flags
}

// ---------------------------------------------------------------------------
// Hard ceilings
// ---------------------------------------------------------------------------

/// Reject a source voltage above `limit` (or one that is not a real,
/// non-negative number).
pub fn check_voltage(requested: f64, limit: f64) -> Result<()> {
    if requested.is_nan() || requested < 0.0 {
        return Err(Error::InvalidConfiguration(format!(
            "source voltage {requested} must be a non-negative number"
        )));
    }
    if requested > limit {
        return Err(Error::SafetyLimitExceeded {
            quantity: "voltage",
            requested,
            limit,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

/// Latches dose warnings for the active frequency.
#[derive(Debug, Default)]
pub struct SafetyMonitor {
    warnings: u8,
}

impl SafetyMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-evaluate against a freshly computed dose.  Returns the bitmask.
    pub fn evaluate(&mut self, dose: &FrequencyDose) -> u8 {
        let flags = dose_warnings(dose);
        for w in DoseWarning::ALL {
            self.eval_warning(w, flags & w.mask() != 0, dose.frequency_khz);
        }
        self.warnings
    }

    /// Current warning bitmask.
    pub fn warnings(&self) -> u8 {
        self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        self.warnings != 0
    }

    pub fn has_warning(&self, warning: DoseWarning) -> bool {
        self.warnings & warning.mask() != 0
    }

    /// Forget every latched warning (no frequency active).
    pub fn clear(&mut self) {
        self.warnings = 0;
    }

    fn eval_warning(&mut self, warning: DoseWarning, condition: bool, frequency_khz: u32) {
        if condition {
            if self.warnings & warning.mask() == 0 {
                warn!("DOSE WARNING SET: {warning} at {frequency_khz} kHz");
            }
            self.warnings |= warning.mask();
        } else {
            if self.warnings & warning.mask() != 0 {
                info!("DOSE WARNING CLEARED: {warning}");
            }
            self.warnings &= !warning.mask();
        }
    }
}
