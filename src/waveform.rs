//! Signal-source settings shared by the port traits, the SCPI adapter and
//! the configuration templates.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Waveform
// ---------------------------------------------------------------------------

/// Basic waveform shapes understood by the signal source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    Sine,
    Square,
    Ramp,
    Pulse,
    Noise,
    Harmonic,
    Custom,
    User,
}

impl Waveform {
    /// Short SCPI mnemonic.
    pub const fn scpi(self) -> &'static str {
        match self {
            Self::Sine => "SIN",
            Self::Square => "SQU",
            Self::Ramp => "RAMP",
            Self::Pulse => "PULS",
            Self::Noise => "NOIS",
            Self::Harmonic => "HARM",
            Self::Custom => "CUST",
            Self::User => "USER",
        }
    }

    /// Parse a short or long SCPI mnemonic (`SIN`, `SINUSOID`, ...).
    pub fn from_scpi(token: &str) -> Result<Self> {
        let t = token.trim().trim_matches('"').to_ascii_uppercase();
        [
            Self::Sine,
            Self::Square,
            Self::Ramp,
            Self::Pulse,
            Self::Noise,
            Self::Harmonic,
            Self::Custom,
            Self::User,
        ]
        .into_iter()
        .find(|w| t.starts_with(w.scpi()))
        .ok_or_else(|| Error::Protocol(format!("unknown waveform {token:?}")))
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scpi())
    }
}

/// Basic waveform applied to the transmit channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveformSettings {
    pub waveform: Waveform,
    pub frequency_hz: f64,
    pub amplitude_vpp: f64,
    pub offset_v: f64,
    pub phase_deg: f64,
}

impl Default for WaveformSettings {
    fn default() -> Self {
        Self {
            waveform: Waveform::Sine,
            frequency_hz: 100.0,
            amplitude_vpp: 0.0,
            offset_v: 0.0,
            phase_deg: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Burst
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BurstMode {
    Triggered,
    Gated,
    Infinity,
}

impl BurstMode {
    pub const fn scpi(self) -> &'static str {
        match self {
            Self::Triggered => "TRIG",
            Self::Gated => "GAT",
            Self::Infinity => "INF",
        }
    }

    pub fn from_scpi(token: &str) -> Result<Self> {
        let t = token.trim().to_ascii_uppercase();
        [Self::Triggered, Self::Gated, Self::Infinity]
            .into_iter()
            .find(|m| t.starts_with(m.scpi()))
            .ok_or_else(|| Error::Protocol(format!("unknown burst mode {token:?}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Internal,
    External,
    Manual,
}

impl TriggerSource {
    pub const fn scpi(self) -> &'static str {
        match self {
            Self::Internal => "INT",
            Self::External => "EXT",
            Self::Manual => "MAN",
        }
    }

    pub fn from_scpi(token: &str) -> Result<Self> {
        let t = token.trim().to_ascii_uppercase();
        [Self::Internal, Self::External, Self::Manual]
            .into_iter()
            .find(|s| t.starts_with(s.scpi()))
            .ok_or_else(|| Error::Protocol(format!("unknown trigger source {token:?}")))
    }
}

/// Edge of the external trigger that starts a burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSlope {
    Positive,
    Negative,
}

impl TriggerSlope {
    pub const fn scpi(self) -> &'static str {
        match self {
            Self::Positive => "POSITIVE",
            Self::Negative => "NEGATIVE",
        }
    }

    pub fn from_scpi(token: &str) -> Result<Self> {
        let t = token.trim().to_ascii_uppercase();
        if t.starts_with("POS") {
            Ok(Self::Positive)
        } else if t.starts_with("NEG") {
            Ok(Self::Negative)
        } else {
            Err(Error::Protocol(format!("unknown trigger slope {token:?}")))
        }
    }
}

/// Gate input polarity in gated burst mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatePolarity {
    Normal,
    Inverted,
}

impl GatePolarity {
    pub const fn scpi(self) -> &'static str {
        match self {
            Self::Normal => "NORM",
            Self::Inverted => "INV",
        }
    }

    pub fn from_scpi(token: &str) -> Result<Self> {
        let t = token.trim().to_ascii_uppercase();
        [Self::Normal, Self::Inverted]
            .into_iter()
            .find(|p| t.starts_with(p.scpi()))
            .ok_or_else(|| Error::Protocol(format!("unknown gate polarity {token:?}")))
    }
}

/// Trigger-out connector behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOut {
    Off,
    Positive,
    Negative,
}

impl TriggerOut {
    pub const fn scpi(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Positive => "POS",
            Self::Negative => "NEG",
        }
    }

    pub fn from_scpi(token: &str) -> Result<Self> {
        match token.trim().to_ascii_uppercase().as_str() {
            "OFF" => Ok(Self::Off),
            "POS" | "POSITIVE" => Ok(Self::Positive),
            "NEG" | "NEGATIVE" => Ok(Self::Negative),
            other => Err(Error::Protocol(format!("unknown trigger out {other:?}"))),
        }
    }
}

/// Burst configuration read back from the source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BurstSettings {
    pub enabled: bool,
    pub period_s: f64,
    pub mode: BurstMode,
    pub cycles: u32,
    pub phase_deg: f64,
    pub delay_s: f64,
    pub trigger_slope: TriggerSlope,
    pub trigger_source: TriggerSource,
    pub trigger_out: TriggerOut,
    pub gate_polarity: GatePolarity,
}

/// Partial burst update; `None` fields are left untouched on the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BurstUpdate {
    pub enabled: Option<bool>,
    pub period_s: Option<f64>,
    pub mode: Option<BurstMode>,
    pub cycles: Option<u32>,
    pub phase_deg: Option<f64>,
    pub delay_s: Option<f64>,
    pub trigger_slope: Option<TriggerSlope>,
    pub trigger_source: Option<TriggerSource>,
    pub trigger_out: Option<TriggerOut>,
    pub gate_polarity: Option<GatePolarity>,
}

impl BurstUpdate {
    /// Cycles-and-period update issued on every frequency change.
    pub fn timing(cycles: u32, period_s: f64) -> Self {
        Self {
            cycles: Some(cycles),
            period_s: Some(period_s),
            ..Self::default()
        }
    }
}
