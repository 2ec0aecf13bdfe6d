//! Guarded access to the transmit channel.
//!
//! Every call into the [`SignalSource`] goes through [`TransmitChannel`], so
//! the voltage ceiling is checked before a single byte reaches the device.

use log::info;

use crate::error::Result;
use crate::safety;
use crate::waveform::{BurstSettings, BurstUpdate, WaveformSettings};

use super::ports::SignalSource;

pub struct TransmitChannel {
    source: Box<dyn SignalSource>,
    max_voltage_vpp: f64,
}

impl TransmitChannel {
    pub fn new(source: Box<dyn SignalSource>, max_voltage_vpp: f64) -> Self {
        Self {
            source,
            max_voltage_vpp,
        }
    }

    pub fn max_voltage_vpp(&self) -> f64 {
        self.max_voltage_vpp
    }

    pub fn open(&mut self) -> Result<()> {
        self.source.open()
    }

    pub fn close(&mut self) -> Result<()> {
        self.source.close()
    }

    pub fn is_open(&self) -> bool {
        self.source.is_open()
    }

    /// Apply a waveform template.  Its amplitude is held to the same ceiling
    /// as [`set_voltage`](Self::set_voltage).
    pub fn apply_waveform(&mut self, settings: &WaveformSettings) -> Result<()> {
        safety::check_voltage(settings.amplitude_vpp, self.max_voltage_vpp)?;
        self.source.apply_waveform(settings)
    }

    pub fn set_burst(&mut self, update: &BurstUpdate) -> Result<()> {
        self.source.set_burst(update)
    }

    pub fn set_output_enabled(&mut self, enabled: bool) -> Result<()> {
        self.source.set_output_enabled(enabled)
    }

    pub fn set_frequency(&mut self, frequency_hz: f64) -> Result<()> {
        self.source.set_frequency(frequency_hz)
    }

    /// Program the amplitude, refusing anything above the ceiling.
    pub fn set_voltage(&mut self, amplitude_vpp: f64) -> Result<()> {
        safety::check_voltage(amplitude_vpp, self.max_voltage_vpp)?;
        self.source.set_voltage(amplitude_vpp)
    }

    /// Read back waveform and burst settings and log them.
    pub fn verify(&mut self) -> Result<(WaveformSettings, BurstSettings)> {
        let settings = self.source.settings()?;
        let burst = self.source.burst()?;
        info!(
            "XMIT | verify: {} {:.1} Hz {:.3} Vpp | burst {} cycles / {:.4} s",
            settings.waveform,
            settings.frequency_hz,
            settings.amplitude_vpp,
            burst.cycles,
            burst.period_s
        );
        Ok((settings, burst))
    }
}
