//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter              | Implements         | Connects to                 |
//! |----------------------|--------------------|-----------------------------|
//! | `function_generator` | SignalSource       | SCPI function generator     |
//! | `rf_switch`          | RoutingSwitch      | SPnT RF switch (SCPI)       |
//! | `scpi`               | ScpiTransport      | USB serial line             |
//! |                      | Connector          |                             |
//! | `discovery`          | PortScanner        | OS serial port enumeration  |
//! | `time`               | Clock              | `std::time::Instant`        |
//! | `log_sink`           | Notifier           | `log` facade                |
//! | `callbacks`          | Notifier           | Front-end closures          |

pub mod callbacks;
pub mod discovery;
pub mod function_generator;
pub mod log_sink;
pub mod rf_switch;
pub mod scpi;
pub mod time;

use crate::app::controller::Instruments;
use crate::app::ports::RoutingSwitch;
use crate::config::SystemConfig;
use crate::profile::Profile;

use discovery::SystemPortScanner;
use function_generator::FunctionGenerator;
use rf_switch::RfSwitch;
use scpi::SerialConnector;

/// Real instruments on the host's USB serial ports: the function generator
/// and one RF switch per profile serial number.
pub fn serial_instruments(config: &SystemConfig, profile: &Profile) -> Instruments {
    let connector = SerialConnector::new(config.serial);
    let source = FunctionGenerator::new(config, Box::new(SystemPortScanner), Box::new(connector));
    let switches = profile
        .switch_serials
        .iter()
        .map(|sn| {
            Box::new(RfSwitch::new(
                config,
                Some(sn.as_str()),
                Box::new(SystemPortScanner),
                Box::new(connector),
            )) as Box<dyn RoutingSwitch>
        })
        .collect();
    Instruments {
        source: Box::new(source),
        switches,
    }
}
