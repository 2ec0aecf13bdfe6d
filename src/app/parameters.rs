//! Treatment parameters and their validation rules.

use std::time::Duration;

use crate::dose::{self, DoseRequest, PowerMode};
use crate::error::{Error, Result};
use crate::profile::Profile;

/// Operator-selected treatment parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TreatmentParameters {
    /// Frequencies (kHz) in treatment order.
    pub frequencies_khz: Vec<u32>,
    pub power_mode: PowerMode,
    /// Units depend on `power_mode`.
    pub power_value: f64,
    pub burst_length_s: f64,
    pub duty_cycle: f64,
    /// Treatment time per frequency.
    pub duration: Duration,
}

impl TreatmentParameters {
    /// Profile defaults with every profile frequency selected.
    pub fn from_profile(profile: &Profile, power_mode: PowerMode) -> Self {
        Self {
            frequencies_khz: profile.frequencies_khz.clone(),
            power_mode,
            power_value: power_mode.settings().default,
            burst_length_s: profile.default_burst_length_s,
            duty_cycle: profile.default_duty_cycle,
            duration: Duration::from_secs_f64(profile.default_duration_s),
        }
    }

    pub fn dose_request(&self) -> DoseRequest {
        DoseRequest {
            mode: self.power_mode,
            value: self.power_value,
            burst_length_s: self.burst_length_s,
            duty_cycle: self.duty_cycle,
        }
    }

    /// Burst repetition period programmed on the source.
    pub fn burst_period_s(&self) -> f64 {
        dose::burst_period(self.burst_length_s, self.duty_cycle)
    }
}

pub fn validate_frequencies(frequencies_khz: &[u32]) -> Result<()> {
    for (i, f) in frequencies_khz.iter().enumerate() {
        if *f == 0 {
            return Err(Error::InvalidConfiguration("frequency must be positive".into()));
        }
        if frequencies_khz[..i].contains(f) {
            return Err(Error::InvalidConfiguration(format!(
                "frequency {f} kHz selected twice"
            )));
        }
    }
    Ok(())
}

pub fn validate_burst_length(burst_length_s: f64) -> Result<()> {
    if burst_length_s.is_finite() && burst_length_s > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidConfiguration(format!(
            "burst length {burst_length_s} s must be positive"
        )))
    }
}

pub fn validate_duty_cycle(duty_cycle: f64) -> Result<()> {
    if duty_cycle > 0.0 && duty_cycle <= 1.0 {
        Ok(())
    } else {
        Err(Error::InvalidConfiguration(format!(
            "duty cycle {duty_cycle} outside (0, 1]"
        )))
    }
}

pub fn validate_duration(duration: Duration) -> Result<()> {
    if duration.is_zero() {
        Err(Error::InvalidConfiguration("duration must be positive".into()))
    } else {
        Ok(())
    }
}
