//! System configuration parameters
//!
//! Everything the treatment controller needs that does not depend on the
//! transducer/construct profile: amplifier, source limits, device ids,
//! serial line settings and loop timing.  Loaded once at startup and passed
//! explicitly to constructors.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dose::PowerMode;
use crate::error::{Error, Result};
use crate::waveform::{
    BurstMode, BurstUpdate, GatePolarity, TriggerOut, TriggerSlope, TriggerSource, WaveformSettings,
};

/// Maximum number of source channels tracked.
pub const MAX_SOURCE_CHANNELS: usize = 4;

/// USB vendor/product id pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbId {
    pub vid: u16,
    pub pid: u16,
}

/// Serial line settings shared by every instrument link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialSettings {
    pub baud_rate: u32,
    /// Read timeout (milliseconds)
    pub timeout_ms: u64,
}

impl SerialSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Amplifier / source ---
    /// RF amplifier voltage gain (output V / input V)
    pub amplifier_gain: f64,
    /// Hard ceiling on the programmed source amplitude (Vpp)
    pub max_voltage_vpp: f64,
    /// Source channel that drives the transducer
    pub transmit_channel: u8,
    /// Every source channel (all are disabled on close)
    pub source_channels: heapless::Vec<u8, MAX_SOURCE_CHANNELS>,
    /// Waveform applied on connect
    pub source_template: WaveformSettings,
    /// Burst settings applied on connect
    pub burst_template: BurstUpdate,

    // --- Devices ---
    pub function_generator: UsbId,
    pub rf_switch: UsbId,
    pub serial: SerialSettings,

    // --- Timing ---
    /// Worker poll interval while idle (milliseconds)
    pub poll_interval_ms: u64,
    /// Wait between switch write and read-back (milliseconds)
    pub switch_settle_ms: u64,

    // --- Defaults ---
    pub default_power_mode: PowerMode,
}

impl Default for SystemConfig {
    fn default() -> Self {
        let mut source_channels = heapless::Vec::new();
        source_channels.extend([1, 2]);

        Self {
            // Amplifier / source
            amplifier_gain: 562.3,
            max_voltage_vpp: 1.5,
            transmit_channel: 1,
            source_channels,
            source_template: WaveformSettings::default(), // SIN 100 Hz, 0 Vpp
            burst_template: BurstUpdate {
                enabled: Some(true),
                period_s: Some(0.1),
                mode: Some(BurstMode::Triggered),
                cycles: Some(1),
                phase_deg: Some(0.0),
                delay_s: Some(0.0),
                trigger_slope: Some(TriggerSlope::Positive),
                trigger_source: Some(TriggerSource::Internal),
                trigger_out: Some(TriggerOut::Positive),
                gate_polarity: Some(GatePolarity::Normal),
            },

            // Devices
            function_generator: UsbId {
                vid: 0x1AB1,
                pid: 0x0641,
            },
            rf_switch: UsbId {
                vid: 0x10C4,
                pid: 0xEA71,
            },
            serial: SerialSettings {
                baud_rate: 115_200,
                timeout_ms: 1000,
            },

            // Timing
            poll_interval_ms: 100, // 10 Hz
            switch_settle_ms: 100,

            // Defaults
            default_power_mode: PowerMode::ConstantMi,
        }
    }
}

impl SystemConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Reject values that would make the controller unsafe or inert.
    pub fn validate(&self) -> Result<()> {
        if self.amplifier_gain.is_nan() || self.amplifier_gain <= 0.0 {
            return Err(Error::InvalidConfiguration(
                "amplifier_gain must be positive".into(),
            ));
        }
        if self.max_voltage_vpp.is_nan() || self.max_voltage_vpp <= 0.0 {
            return Err(Error::InvalidConfiguration(
                "max_voltage_vpp must be positive".into(),
            ));
        }
        if !self.source_channels.contains(&self.transmit_channel) {
            return Err(Error::InvalidConfiguration(format!(
                "transmit_channel {} not among source_channels {:?}",
                self.transmit_channel, self.source_channels
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::InvalidConfiguration(
                "poll_interval_ms must be non-zero".into(),
            ));
        }
        if self.source_template.amplitude_vpp > self.max_voltage_vpp {
            return Err(Error::InvalidConfiguration(
                "source_template amplitude above max_voltage_vpp".into(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn switch_settle(&self) -> Duration {
        Duration::from_millis(self.switch_settle_ms)
    }
}
