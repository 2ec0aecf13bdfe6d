//! Line-oriented SCPI transport over a USB serial port.
//!
//! Commands are written newline-terminated; a query then reads back one
//! line.  [`Connector`] opens a transport for a device path so adapters can
//! be built before the hardware is discovered.

use std::io::{BufRead, BufReader, Write};

use log::debug;
use serialport::SerialPort;

use crate::config::SerialSettings;
use crate::error::{Error, Result};

/// A command/response channel to one instrument.
pub trait ScpiTransport: Send {
    fn write(&mut self, command: &str) -> Result<()>;

    /// Write `command` and return the trimmed response line.
    fn query(&mut self, command: &str) -> Result<String>;
}

/// Opens a [`ScpiTransport`] for a discovered or configured device path.
pub trait Connector: Send {
    fn connect(&mut self, path: &str) -> Result<Box<dyn ScpiTransport>>;
}

// ───────────────────────────────────────────────────────────────
// Serial implementation
// ───────────────────────────────────────────────────────────────

pub struct SerialTransport {
    path: String,
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    pub fn open(path: &str, settings: &SerialSettings) -> Result<Self> {
        let port = serialport::new(path, settings.baud_rate)
            .timeout(settings.timeout())
            .open()?;
        Ok(Self {
            path: path.to_string(),
            port,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn read_line(&mut self) -> Result<String> {
        let mut reader = BufReader::new(&mut self.port);
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(Error::Protocol(format!("{}: empty response", self.path)));
        }
        Ok(line.trim().to_string())
    }
}

impl ScpiTransport for SerialTransport {
    fn write(&mut self, command: &str) -> Result<()> {
        debug!("SCPI | {} <- {command}", self.path);
        self.port.write_all(command.as_bytes())?;
        self.port.write_all(b"\n")?;
        self.port.flush()?;
        Ok(())
    }

    fn query(&mut self, command: &str) -> Result<String> {
        self.write(command)?;
        let response = self.read_line()?;
        debug!("SCPI | {} -> {response}", self.path);
        Ok(response)
    }
}

/// Opens [`SerialTransport`]s with fixed line settings.
#[derive(Debug, Clone, Copy)]
pub struct SerialConnector {
    settings: SerialSettings,
}

impl SerialConnector {
    pub fn new(settings: SerialSettings) -> Self {
        Self { settings }
    }
}

impl Connector for SerialConnector {
    fn connect(&mut self, path: &str) -> Result<Box<dyn ScpiTransport>> {
        Ok(Box::new(SerialTransport::open(path, &self.settings)?))
    }
}

// ---------------------------------------------------------------------------
// Response parsing helpers
// ---------------------------------------------------------------------------

pub(crate) fn parse_f64(what: &str, token: &str) -> Result<f64> {
    token
        .trim()
        .parse::<f64>()
        .map_err(|_| Error::Protocol(format!("{what}: expected a number, got {token:?}")))
}

pub(crate) fn parse_on_off(what: &str, token: &str) -> Result<bool> {
    match token.trim().to_ascii_uppercase().as_str() {
        "ON" | "1" => Ok(true),
        "OFF" | "0" => Ok(false),
        other => Err(Error::Protocol(format!("{what}: expected ON/OFF, got {other:?}"))),
    }
}

pub(crate) const fn on_off(enabled: bool) -> &'static str {
    if enabled { "ON" } else { "OFF" }
}
