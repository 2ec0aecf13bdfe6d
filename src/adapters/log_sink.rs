//! Log-based notifier adapter.
//!
//! Implements [`Notifier`] by writing every [`ControlEvent`] to the `log`
//! facade.  The console front end uses it as its only output.

use log::{debug, error, info};

use crate::app::events::ControlEvent;
use crate::app::ports::Notifier;
use crate::dose::format_clock;

/// Adapter that logs every [`ControlEvent`].
#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Notifier for LogNotifier {
    fn notify(&mut self, event: &ControlEvent) {
        match event {
            ControlEvent::Opened(s) => {
                info!(
                    "OPENED | {} | simulate={} | ready={}",
                    s.connection, s.simulate, s.ready
                );
            }
            ControlEvent::Treating {
                index,
                frequency_khz,
            } => {
                info!("TREAT | [{index}] {frequency_khz} kHz");
            }
            ControlEvent::Waiting { elapsed, duration } => {
                debug!(
                    "WAIT | {} / {}",
                    format_clock(elapsed.as_secs_f64()),
                    format_clock(duration.as_secs_f64())
                );
            }
            ControlEvent::Ended(message) => {
                info!("END | {message}");
            }
            ControlEvent::Closed => {
                info!("CLOSED | hardware released");
            }
            ControlEvent::Error(e) => {
                error!("ERROR | {e}");
            }
        }
    }
}
