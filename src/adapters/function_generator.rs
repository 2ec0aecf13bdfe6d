//! SCPI function generator adapter.
//!
//! Implements [`SignalSource`] for a two-channel arbitrary function
//! generator on USB serial.  Only the transmit channel is programmed;
//! every configured channel is switched off on close.

use log::{error, info, warn};

use crate::app::ports::SignalSource;
use crate::config::{MAX_SOURCE_CHANNELS, SystemConfig};
use crate::error::{Error, Result};
use crate::waveform::{
    BurstMode, BurstSettings, BurstUpdate, GatePolarity, TriggerOut, TriggerSlope, TriggerSource,
    Waveform, WaveformSettings,
};

use super::discovery::{self, PortScanner, UsbFilter};
use super::scpi::{self, Connector, ScpiTransport};

pub struct FunctionGenerator {
    filter: UsbFilter,
    port: Option<String>,
    scanner: Box<dyn PortScanner>,
    connector: Box<dyn Connector>,
    transport: Option<Box<dyn ScpiTransport>>,
    channel: u8,
    channels: heapless::Vec<u8, MAX_SOURCE_CHANNELS>,
    identity: String,
}

impl FunctionGenerator {
    pub fn new(
        config: &SystemConfig,
        scanner: Box<dyn PortScanner>,
        connector: Box<dyn Connector>,
    ) -> Self {
        Self {
            filter: config.function_generator.into(),
            port: None,
            scanner,
            connector,
            transport: None,
            channel: config.transmit_channel,
            channels: config.source_channels.clone(),
            identity: String::new(),
        }
    }

    /// Skip discovery and connect to `path`.
    #[must_use]
    pub fn with_port(mut self, path: impl Into<String>) -> Self {
        self.port = Some(path.into());
        self
    }

    /// `*IDN?` response from the last open.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    fn transport(&mut self) -> Result<&mut Box<dyn ScpiTransport>> {
        self.transport.as_mut().ok_or(Error::NotReady)
    }

    fn write(&mut self, command: &str) -> Result<()> {
        info!("FGEN | {command}");
        self.transport()?.write(command)
    }

    fn query(&mut self, command: &str) -> Result<String> {
        self.transport()?.query(command)
    }

    fn burst_query(&mut self, attr: &str) -> Result<String> {
        let command = format!("SOURCE{}:BURST:{attr}?", self.channel);
        self.query(&command)
    }
}

impl SignalSource for FunctionGenerator {
    fn open(&mut self) -> Result<()> {
        if self.transport.is_some() {
            warn!("FGEN | already connected");
            return Ok(());
        }
        let path = match &self.port {
            Some(path) => path.clone(),
            None => discovery::discover(self.scanner.as_ref(), &self.filter)?.path,
        };
        let mut transport = self.connector.connect(&path)?;
        self.identity = transport.query("*IDN?")?;
        self.transport = Some(transport);
        self.port = Some(path);
        info!("FGEN | connected: {}", self.identity);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.transport.is_none() {
            warn!("FGEN | already disconnected");
            return Ok(());
        }
        for ch in self.channels.clone() {
            if let Err(e) = self.write(&format!("OUTPUT{ch}:STAT OFF")) {
                error!("FGEN | unable to disable output {ch}, attempting reset");
                if let Err(reset) = self.write("*RST") {
                    error!("FGEN | reset failed: {reset}");
                }
                return Err(e);
            }
        }
        self.transport = None;
        info!("FGEN | disconnected");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    fn apply_waveform(&mut self, settings: &WaveformSettings) -> Result<()> {
        let command = apply_command(self.channel, settings);
        self.write(&command)
    }

    fn set_burst(&mut self, update: &BurstUpdate) -> Result<()> {
        for command in burst_commands(self.channel, update) {
            self.write(&command)?;
        }
        Ok(())
    }

    fn set_output_enabled(&mut self, enabled: bool) -> Result<()> {
        let command = format!("OUTPUT{}:STAT {}", self.channel, scpi::on_off(enabled));
        self.write(&command)
    }

    fn set_frequency(&mut self, frequency_hz: f64) -> Result<()> {
        let command = format!("SOURCE{}:FREQUENCY:FIXED {frequency_hz}", self.channel);
        self.write(&command)
    }

    fn set_voltage(&mut self, amplitude_vpp: f64) -> Result<()> {
        let command = format!(
            "SOURCE{}:VOLTAGE:LEVEL:IMMEDIATE:AMPLITUDE {amplitude_vpp}",
            self.channel
        );
        self.write(&command)
    }

    fn settings(&mut self) -> Result<WaveformSettings> {
        let command = format!("SOURCE{}:APPLY?", self.channel);
        let response = self.query(&command)?;
        parse_apply(&response)
    }

    fn burst(&mut self) -> Result<BurstSettings> {
        Ok(BurstSettings {
            enabled: scpi::parse_on_off("burst state", &self.burst_query("STAT")?)?,
            period_s: scpi::parse_f64("burst period", &self.burst_query("INTERNAL:PERIOD")?)?,
            mode: BurstMode::from_scpi(&self.burst_query("MODE")?)?,
            cycles: scpi::parse_f64("burst cycles", &self.burst_query("NCYCLES")?)?.round() as u32,
            phase_deg: scpi::parse_f64("burst phase", &self.burst_query("PHASE")?)?,
            delay_s: scpi::parse_f64("burst delay", &self.burst_query("TDELAY")?)?,
            trigger_slope: TriggerSlope::from_scpi(&self.burst_query("TRIG:SLOPE")?)?,
            trigger_source: TriggerSource::from_scpi(&self.burst_query("TRIG:SOURCE")?)?,
            trigger_out: TriggerOut::from_scpi(&self.burst_query("TRIG:TRIGOUT")?)?,
            gate_polarity: GatePolarity::from_scpi(&self.burst_query("GATE:POL")?)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Command building / response parsing
// ---------------------------------------------------------------------------

/// `SOUR{n}:APPLY:{mode} args`.  Noise takes no frequency; pulse takes a
/// delay in place of the phase (left at the device default here).
fn apply_command(channel: u8, s: &WaveformSettings) -> String {
    let args: Vec<f64> = match s.waveform {
        Waveform::Noise => vec![s.amplitude_vpp, s.offset_v],
        Waveform::Pulse => vec![s.frequency_hz, s.amplitude_vpp, s.offset_v],
        _ => vec![s.frequency_hz, s.amplitude_vpp, s.offset_v, s.phase_deg],
    };
    let args: Vec<String> = args.iter().map(f64::to_string).collect();
    format!("SOUR{channel}:APPLY:{} {}", s.waveform.scpi(), args.join(", "))
}

fn burst_commands(channel: u8, u: &BurstUpdate) -> Vec<String> {
    let fields = [
        ("STATE", u.enabled.map(|b| scpi::on_off(b).to_string())),
        ("INTERNAL:PERIOD", u.period_s.map(|v| v.to_string())),
        ("MODE", u.mode.map(|m| m.scpi().to_string())),
        ("NCYCLES", u.cycles.map(|c| c.to_string())),
        ("PHASE", u.phase_deg.map(|v| v.to_string())),
        ("TDELAY", u.delay_s.map(|v| v.to_string())),
        ("TRIG:SLOPE", u.trigger_slope.map(|t| t.scpi().to_string())),
        ("TRIG:SOURCE", u.trigger_source.map(|t| t.scpi().to_string())),
        ("TRIG:TRIGOUT", u.trigger_out.map(|t| t.scpi().to_string())),
        ("GATE:POL", u.gate_polarity.map(|p| p.scpi().to_string())),
    ];
    fields
        .into_iter()
        .filter_map(|(attr, value)| value.map(|v| format!("SOURCE{channel}:BURST:{attr} {v}")))
        .collect()
}

/// Parse an `APPLY?` response such as `"SIN,1000,0.5,0,0"`.
fn parse_apply(response: &str) -> Result<WaveformSettings> {
    let body = response.trim().trim_matches('"');
    let mut fields = body.split(',');
    let waveform = Waveform::from_scpi(fields.next().unwrap_or_default())?;
    let values = fields
        .map(|v| scpi::parse_f64("apply", v))
        .collect::<Result<Vec<f64>>>()?;
    let value = |i: usize| values.get(i).copied().unwrap_or_default();

    let mut settings = WaveformSettings {
        waveform,
        ..WaveformSettings::default()
    };
    match waveform {
        Waveform::Noise => {
            settings.frequency_hz = 0.0;
            settings.amplitude_vpp = value(0);
            settings.offset_v = value(1);
        }
        Waveform::Pulse => {
            settings.frequency_hz = value(0);
            settings.amplitude_vpp = value(1);
            settings.offset_v = value(2);
        }
        _ => {
            settings.frequency_hz = value(0);
            settings.amplitude_vpp = value(1);
            settings.offset_v = value(2);
            settings.phase_deg = value(3);
        }
    }
    Ok(settings)
}
