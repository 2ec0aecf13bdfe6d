//! USB serial device discovery.
//!
//! Instruments are found by vendor id, then optionally product id and
//! serial number.  Exactly one port must match.

use core::fmt;

use log::{info, warn};
use serialport::SerialPortType;

use crate::config::UsbId;
use crate::error::{Error, Result};

/// A USB serial port as reported by the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbPort {
    pub path: String,
    pub vid: u16,
    pub pid: u16,
    pub serial_number: Option<String>,
    pub product: Option<String>,
}

impl fmt::Display for UsbPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (VID={:04X}, PID={:04X}, SN={})",
            self.path,
            self.vid,
            self.pid,
            self.serial_number.as_deref().unwrap_or("-")
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsbFilter {
    pub vid: u16,
    pub pid: Option<u16>,
    pub serial_number: Option<String>,
}

impl UsbFilter {
    pub fn new(vid: u16) -> Self {
        Self {
            vid,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_pid(mut self, pid: u16) -> Self {
        self.pid = Some(pid);
        self
    }

    #[must_use]
    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    pub fn matches(&self, port: &UsbPort) -> bool {
        port.vid == self.vid
            && self.pid.is_none_or(|pid| port.pid == pid)
            && self
                .serial_number
                .as_deref()
                .is_none_or(|sn| port.serial_number.as_deref() == Some(sn))
    }
}

impl From<UsbId> for UsbFilter {
    fn from(id: UsbId) -> Self {
        Self::new(id.vid).with_pid(id.pid)
    }
}

impl fmt::Display for UsbFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VID={:04X}", self.vid)?;
        if let Some(pid) = self.pid {
            write!(f, ", PID={pid:04X}")?;
        }
        if let Some(sn) = &self.serial_number {
            write!(f, ", SN={sn}")?;
        }
        Ok(())
    }
}

/// Enumerates USB serial ports.
pub trait PortScanner: Send {
    fn scan(&self) -> Result<Vec<UsbPort>>;
}

/// Scans the host's serial ports through `serialport`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPortScanner;

impl PortScanner for SystemPortScanner {
    fn scan(&self) -> Result<Vec<UsbPort>> {
        let ports = serialport::available_ports()?
            .into_iter()
            .filter_map(|info| match info.port_type {
                SerialPortType::UsbPort(usb) => Some(UsbPort {
                    path: info.port_name,
                    vid: usb.vid,
                    pid: usb.pid,
                    serial_number: usb.serial_number,
                    product: usb.product,
                }),
                _ => None,
            })
            .collect();
        Ok(ports)
    }
}

/// Pick the single port matching `filter`.
pub fn select_single(ports: Vec<UsbPort>, filter: &UsbFilter) -> Result<UsbPort> {
    let mut matches: Vec<UsbPort> = ports.into_iter().filter(|p| filter.matches(p)).collect();
    match matches.len() {
        0 => Err(Error::DeviceNotFound(filter.to_string())),
        1 => Ok(matches.remove(0)),
        count => {
            for port in &matches {
                warn!("DISCOVER | candidate {port}");
            }
            Err(Error::AmbiguousDevice {
                filter: filter.to_string(),
                count,
            })
        }
    }
}

pub fn discover(scanner: &dyn PortScanner, filter: &UsbFilter) -> Result<UsbPort> {
    let port = select_single(scanner.scan()?, filter)?;
    info!("DISCOVER | {filter} -> {port}");
    Ok(port)
}
