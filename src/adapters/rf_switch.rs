//! SPnT RF switch adapter.
//!
//! Each switch is found on USB by vendor/product id and, when several are
//! chained, its serial number.  A position change is written, allowed to
//! settle, then read back.

use std::thread;
use std::time::Duration;

use log::{info, warn};

use crate::app::ports::RoutingSwitch;
use crate::config::SystemConfig;
use crate::error::{Error, Result};

use super::discovery::{self, PortScanner, UsbFilter, UsbPort};
use super::scpi::{Connector, ScpiTransport};

/// Position control on an open switch connection.
pub trait SwitchLink: Send {
    fn select(&mut self, position: u8) -> Result<()>;

    fn selected(&mut self) -> Result<u8>;
}

/// `ROUTe:CLOSe` over a SCPI transport.
pub struct ScpiSwitchLink {
    transport: Box<dyn ScpiTransport>,
}

impl ScpiSwitchLink {
    pub fn new(transport: Box<dyn ScpiTransport>) -> Self {
        Self { transport }
    }
}

impl SwitchLink for ScpiSwitchLink {
    fn select(&mut self, position: u8) -> Result<()> {
        self.transport.write(&format!("ROUT:CLOS {position}"))
    }

    fn selected(&mut self) -> Result<u8> {
        let response = self.transport.query("ROUT:CLOS?")?;
        response
            .trim()
            .parse::<u8>()
            .map_err(|_| Error::Protocol(format!("switch position: got {response:?}")))
    }
}

// ───────────────────────────────────────────────────────────────
// RfSwitch
// ───────────────────────────────────────────────────────────────

pub struct RfSwitch {
    filter: UsbFilter,
    port: Option<String>,
    port_info: Option<UsbPort>,
    scanner: Box<dyn PortScanner>,
    connector: Box<dyn Connector>,
    link: Option<Box<dyn SwitchLink>>,
    settle: Duration,
    position: Option<u8>,
}

impl RfSwitch {
    /// A switch matched by the configured USB id and, if given, its serial
    /// number.
    pub fn new(
        config: &SystemConfig,
        serial_number: Option<&str>,
        scanner: Box<dyn PortScanner>,
        connector: Box<dyn Connector>,
    ) -> Self {
        let mut filter = UsbFilter::from(config.rf_switch);
        if let Some(sn) = serial_number {
            filter = filter.with_serial_number(sn);
        }
        Self {
            filter,
            port: None,
            port_info: None,
            scanner,
            connector,
            link: None,
            settle: config.switch_settle(),
            position: None,
        }
    }

    /// Skip discovery and connect to `path`.
    #[must_use]
    pub fn with_port(mut self, path: impl Into<String>) -> Self {
        self.port = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_settle_time(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Port the switch is (or was last) connected on.
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    /// Discovery record from the last open, if discovery ran.
    pub fn port_info(&self) -> Option<&UsbPort> {
        self.port_info.as_ref()
    }

    /// Last position written and verified.
    pub fn last_position(&self) -> Option<u8> {
        self.position
    }

    fn link(&mut self) -> Result<&mut Box<dyn SwitchLink>> {
        self.link.as_mut().ok_or(Error::NotReady)
    }
}

impl RoutingSwitch for RfSwitch {
    fn open(&mut self) -> Result<()> {
        if self.link.is_some() {
            warn!("SWITCH | {} already connected", self.label());
            return Ok(());
        }
        if self.port.is_none() {
            let found = discovery::discover(self.scanner.as_ref(), &self.filter)?;
            self.port = Some(found.path.clone());
            self.port_info = Some(found);
        }
        let path = self.port.clone().unwrap_or_default();
        let transport = self.connector.connect(&path)?;
        self.link = Some(Box::new(ScpiSwitchLink::new(transport)));
        info!("SWITCH | connected ({path})");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.link.take().is_none() {
            warn!("SWITCH | {} already disconnected", self.label());
            return Ok(());
        }
        info!("SWITCH | disconnected ({})", self.label());
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.link.is_some()
    }

    fn set_position(&mut self, position: u8) -> Result<()> {
        let label = self.label();
        let settle = self.settle;
        info!("SWITCH | setting {label} to {position}");
        let link = self.link()?;
        link.select(position)?;
        thread::sleep(settle);
        let read_back = link.selected()?;
        if read_back != position {
            return Err(Error::Verification {
                device: label,
                expected: position.to_string(),
                actual: read_back.to_string(),
            });
        }
        self.position = Some(position);
        info!("SWITCH | {label} at {position}");
        Ok(())
    }

    fn position(&mut self) -> Result<u8> {
        self.link()?.selected()
    }

    fn label(&self) -> String {
        match (&self.port, &self.filter.serial_number) {
            (Some(port), _) => port.clone(),
            (None, Some(sn)) => format!("switch {sn}"),
            (None, None) => format!("switch {}", self.filter),
        }
    }
}
