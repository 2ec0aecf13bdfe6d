//! Dose model: pure conversion from dose targets to hardware settings.
//!
//! ```text
//!  (frequency, power mode, power value, duty)
//!        │
//!        ▼
//!  target_pressure ──▶ target_voltage ──▶ source Vpp
//!        │
//!        └──────────▶ adjusted_burst_length ──▶ burst cycles
//! ```
//!
//! Every function here is stateless and deterministic.  Frequencies are in
//! kHz, pressures in kPa, times in seconds.  The calibration polynomial for a
//! frequency maps amplifier output voltage `v` to peak pressure
//! `P = a·v² + b·v`.

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::safety;

// ---------------------------------------------------------------------------
// Power modes
// ---------------------------------------------------------------------------

/// How the operator expresses the requested dose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerMode {
    /// Percentage of the reference (MI = 1.9) pressure.
    ConstantMi,
    /// Peak pressure in kPa.
    ConstantPressure,
    /// Spatial-peak pulse-average intensity in W/cm².
    ConstantIsppa,
    /// Spatial-peak time-average intensity in mW/cm².
    ConstantIspta,
    /// ISPTA reached by shortening bursts at the reference pressure.
    ConstantIsptaMi100,
}

/// Operator-facing range and units of a [`PowerMode`]'s value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerSettings {
    pub label: &'static str,
    pub units: &'static str,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub default: f64,
}

impl PowerSettings {
    /// Reject values outside the operator range.
    pub fn validate(&self, value: f64) -> Result<()> {
        if value.is_finite() && (self.min..=self.max).contains(&value) {
            Ok(())
        } else {
            Err(Error::InvalidConfiguration(format!(
                "{} {value} {} outside {}..={}",
                self.label, self.units, self.min, self.max
            )))
        }
    }
}

impl PowerMode {
    pub const ALL: [PowerMode; 5] = [
        PowerMode::ConstantMi,
        PowerMode::ConstantPressure,
        PowerMode::ConstantIsppa,
        PowerMode::ConstantIspta,
        PowerMode::ConstantIsptaMi100,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConstantMi => "constant_mi",
            Self::ConstantPressure => "constant_pressure",
            Self::ConstantIsppa => "constant_isppa",
            Self::ConstantIspta => "constant_ispta",
            Self::ConstantIsptaMi100 => "constant_ispta_mi100",
        }
    }

    pub const fn settings(self) -> PowerSettings {
        match self {
            Self::ConstantPressure => PowerSettings {
                label: "Pressure",
                units: "kPa",
                min: 0.0,
                max: 1000.0,
                step: 25.0,
                default: 750.0,
            },
            Self::ConstantMi => PowerSettings {
                label: "MI",
                units: "%",
                min: 0.0,
                max: 200.0,
                step: 5.0,
                default: 100.0,
            },
            Self::ConstantIspta | Self::ConstantIsptaMi100 => PowerSettings {
                label: "ISPTA",
                units: "mW/cm2",
                min: 0.0,
                max: 1000.0,
                step: 10.0,
                default: 720.0,
            },
            Self::ConstantIsppa => PowerSettings {
                label: "ISPPA",
                units: "W/cm2",
                min: 0.0,
                max: 100.0,
                step: 1.0,
                default: 50.0,
            },
        }
    }
}

impl fmt::Display for PowerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PowerMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| Error::InvalidConfiguration(format!("unknown power mode {s:?}")))
    }
}

// ---------------------------------------------------------------------------
// Calibration
// ---------------------------------------------------------------------------

/// Transducer calibration at one frequency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationEntry {
    /// Pressure (kPa) delivering MI = 1.9 at this frequency.
    #[serde(rename = "p_ref")]
    pub reference_pressure_kpa: f64,
    /// Quadratic coefficient of `P = a·v² + b·v`.
    #[serde(rename = "a")]
    pub coeff_a: f64,
    /// Linear coefficient of `P = a·v² + b·v`.
    #[serde(rename = "b")]
    pub coeff_b: f64,
}

impl CalibrationEntry {
    pub const fn new(reference_pressure_kpa: f64, coeff_a: f64, coeff_b: f64) -> Self {
        Self {
            reference_pressure_kpa,
            coeff_a,
            coeff_b,
        }
    }
}

/// Frequency (kHz) to calibration map.  Immutable once loaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationTable(BTreeMap<u32, CalibrationEntry>);

impl CalibrationTable {
    pub fn get(&self, frequency_khz: u32) -> Option<&CalibrationEntry> {
        self.0.get(&frequency_khz)
    }

    /// Look up a frequency, failing with [`Error::MissingCalibration`].
    pub fn entry(&self, frequency_khz: u32) -> Result<&CalibrationEntry> {
        self.0
            .get(&frequency_khz)
            .ok_or(Error::MissingCalibration(frequency_khz))
    }

    pub fn contains(&self, frequency_khz: u32) -> bool {
        self.0.contains_key(&frequency_khz)
    }

    pub fn frequencies(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(u32, CalibrationEntry)> for CalibrationTable {
    fn from_iter<I: IntoIterator<Item = (u32, CalibrationEntry)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// Acoustic relations
// ---------------------------------------------------------------------------

/// Spatial-peak pulse-average intensity (W/cm²) for a peak pressure (kPa).
pub fn isppa_from_pressure(pressure_kpa: f64) -> f64 {
    (pressure_kpa * 1e3).powi(2) / 3e6 / 1e4
}

/// Peak pressure (kPa) for a spatial-peak pulse-average intensity (W/cm²).
pub fn pressure_from_isppa(isppa: f64) -> f64 {
    (isppa * 3e6).sqrt() * 1e-1
}

/// Mechanical index for a peak pressure (kPa) at a frequency (kHz).
pub fn mechanical_index(pressure_kpa: f64, frequency_khz: u32) -> f64 {
    pressure_kpa * 1e-3 / (f64::from(frequency_khz) * 1e-3).sqrt()
}

/// Burst repetition period: `burst_length × round(1 / duty, 4)`.
pub fn burst_period(burst_length_s: f64, duty_cycle: f64) -> f64 {
    burst_length_s * round_to(1.0 / duty_cycle, 4)
}

/// Number of carrier cycles in one burst.
pub fn burst_cycles(burst_length_s: f64, frequency_khz: u32) -> u32 {
    (burst_length_s * 1e3 * f64::from(frequency_khz)).round() as u32
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

fn check_duty(duty_cycle: f64) -> Result<()> {
    if duty_cycle > 0.0 && duty_cycle <= 1.0 {
        Ok(())
    } else {
        Err(Error::InvalidConfiguration(format!(
            "duty cycle {duty_cycle} outside (0, 1]"
        )))
    }
}

// ---------------------------------------------------------------------------
// Dose → hardware
// ---------------------------------------------------------------------------

/// Peak pressure (kPa) needed to honour the requested dose.
///
/// Returns 0 when no frequency is selected yet.
pub fn target_pressure(
    frequency_khz: Option<u32>,
    mode: PowerMode,
    value: f64,
    duty_cycle: f64,
    calibration: &CalibrationTable,
) -> Result<f64> {
    let Some(frequency) = frequency_khz else {
        return Ok(0.0);
    };
    let pressure = match mode {
        PowerMode::ConstantPressure => value,
        PowerMode::ConstantMi => value / 100.0 * calibration.entry(frequency)?.reference_pressure_kpa,
        PowerMode::ConstantIsppa => pressure_from_isppa(value),
        PowerMode::ConstantIspta => {
            check_duty(duty_cycle)?;
            pressure_from_isppa(value * 1e-3 / duty_cycle)
        }
        PowerMode::ConstantIsptaMi100 => calibration.entry(frequency)?.reference_pressure_kpa,
    };
    Ok(pressure)
}

/// Source voltage (Vpp, before the amplifier) producing `pressure_kpa`.
///
/// Solves `a·v² + b·v = P` for the positive root, rounds the amplifier
/// output to 10 mV and divides by the amplifier gain.
pub fn target_voltage(
    frequency_khz: Option<u32>,
    pressure_kpa: f64,
    calibration: &CalibrationTable,
    amplifier_gain: f64,
) -> Result<f64> {
    let Some(frequency) = frequency_khz else {
        return Ok(0.0);
    };
    if amplifier_gain.is_nan() || amplifier_gain <= 0.0 {
        return Err(Error::InvalidConfiguration(format!(
            "amplifier gain {amplifier_gain} must be positive"
        )));
    }
    let CalibrationEntry { coeff_a: a, coeff_b: b, .. } = *calibration.entry(frequency)?;

    let amplified = if a == 0.0 {
        if b == 0.0 {
            return Err(Error::Domain(format!(
                "{frequency} kHz calibration is identically zero"
            )));
        }
        pressure_kpa / b
    } else {
        let discriminant = b * b + 4.0 * a * pressure_kpa;
        if discriminant < 0.0 {
            return Err(Error::Domain(format!(
                "{pressure_kpa:.1} kPa unreachable at {frequency} kHz"
            )));
        }
        (-b + discriminant.sqrt()) / (2.0 * a)
    };

    Ok(round_to(amplified, 2) / amplifier_gain)
}

/// Burst length (s) actually transmitted.
///
/// Only [`PowerMode::ConstantIsptaMi100`] shortens the burst: pressure is
/// pinned to the reference and the duty cycle is scaled to reach the
/// requested ISPTA.  A request the reference pressure cannot deliver even at
/// 100 % duty fails with [`Error::Domain`].
pub fn adjusted_burst_length(
    frequency_khz: Option<u32>,
    mode: PowerMode,
    value: f64,
    burst_length_s: f64,
    duty_cycle: f64,
    calibration: &CalibrationTable,
) -> Result<f64> {
    let Some(frequency) = frequency_khz else {
        return Ok(burst_length_s);
    };
    if mode != PowerMode::ConstantIsptaMi100 {
        return Ok(burst_length_s);
    }
    check_duty(duty_cycle)?;

    let reference = calibration.entry(frequency)?.reference_pressure_kpa;
    let isppa_ref = isppa_from_pressure(reference);
    let period = burst_length_s / duty_cycle;
    let adjusted_duty = value * 1e-3 / isppa_ref;
    if adjusted_duty.is_nan() || adjusted_duty > 1.0 {
        return Err(Error::Domain(format!(
            "{value} mW/cm2 needs duty {adjusted_duty:.3} at {frequency} kHz"
        )));
    }
    Ok(period * adjusted_duty)
}

// ---------------------------------------------------------------------------
// Display metrics
// ---------------------------------------------------------------------------

/// The dose-shaping inputs of a treatment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoseRequest {
    pub mode: PowerMode,
    pub value: f64,
    pub burst_length_s: f64,
    pub duty_cycle: f64,
}

/// Everything the operator sees for one frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyDose {
    pub frequency_khz: u32,
    pub pressure_kpa: f64,
    /// Source voltage before the amplifier (Vpp).
    pub input_voltage: f64,
    pub mechanical_index: f64,
    /// W/cm².
    pub isppa: f64,
    /// mW/cm².
    pub ispta: f64,
    pub burst_length_s: f64,
    pub period_s: f64,
    pub duty_cycle: f64,
    /// Bitmask of [`safety::DoseWarning`]s.
    pub warnings: u8,
}

impl FrequencyDose {
    pub fn has_warnings(&self) -> bool {
        self.warnings != 0
    }
}

/// Compute the display metrics for one frequency.
pub fn evaluate_frequency(
    frequency_khz: u32,
    request: &DoseRequest,
    calibration: &CalibrationTable,
    amplifier_gain: f64,
) -> Result<FrequencyDose> {
    let f = Some(frequency_khz);
    let pressure = target_pressure(f, request.mode, request.value, request.duty_cycle, calibration)?;
    let input_voltage = target_voltage(f, pressure, calibration, amplifier_gain)?;
    let burst_length = adjusted_burst_length(
        f,
        request.mode,
        request.value,
        request.burst_length_s,
        request.duty_cycle,
        calibration,
    )?;

    let period = request.burst_length_s / request.duty_cycle;
    let duty_cycle = burst_length / period;
    let isppa = isppa_from_pressure(pressure);

    let mut dose = FrequencyDose {
        frequency_khz,
        pressure_kpa: pressure,
        input_voltage,
        mechanical_index: mechanical_index(pressure, frequency_khz),
        isppa,
        ispta: isppa * duty_cycle * 1e3,
        burst_length_s: burst_length,
        period_s: period,
        duty_cycle,
        warnings: 0,
    };
    dose.warnings = safety::dose_warnings(&dose);
    Ok(dose)
}

/// Render seconds as `MM:SS`, or `H:MM:SS` from one hour up.
pub fn format_clock(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    let (h, m, s) = (total / 3600, (total / 60) % 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}
