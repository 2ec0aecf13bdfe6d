//! Shared mutable context threaded through every sequencer handler.
//!
//! `SweepContext` owns everything the worker thread needs: the
//! [`Controller`], the [`Notifier`] and the sweep position.  It moves onto
//! the worker when the queue starts and comes back when the worker is
//! joined, so no two threads ever hold the controller at once.

use log::warn;

use crate::app::controller::Controller;
use crate::app::events::{ControlEvent, ControllerStatus};
use crate::app::ports::Notifier;
use crate::error::{Error, Result};

use super::StateId;

/// Message sent with [`ControlEvent::Ended`] when the sweep runs out of
/// frequencies.
pub const TREATMENT_COMPLETE: &str = "Treatment Complete";

pub struct SweepContext {
    pub controller: Controller,
    pub notifier: Box<dyn Notifier>,
    /// Position in the selected frequency list.
    pub frequency_index: usize,
    /// Polls since the current state was entered.
    pub polls_in_state: u64,
}

impl SweepContext {
    pub fn new(controller: Controller, notifier: Box<dyn Notifier>) -> Self {
        Self {
            controller,
            notifier,
            frequency_index: 0,
            polls_in_state: 0,
        }
    }

    pub fn notify(&mut self, event: &ControlEvent) {
        self.notifier.notify(event);
    }

    /// Start treating the first calibrated frequency at or after `index`.
    ///
    /// Uncalibrated frequencies are skipped with a warning.  Returns `false`
    /// when the selection is exhausted.
    pub fn start_frequency_from(&mut self, index: usize) -> Result<bool> {
        let frequencies = self.controller.parameters().frequencies_khz.clone();
        for (i, &frequency) in frequencies.iter().enumerate().skip(index) {
            match self.controller.set_frequency(frequency) {
                Ok(()) => {}
                Err(Error::MissingCalibration(f)) => {
                    warn!("SEQ | skipping {f} kHz: no calibration entry");
                    continue;
                }
                Err(e) => return Err(e),
            }
            self.frequency_index = i;
            self.controller.start_treatment(true)?;
            self.notify(&ControlEvent::Treating {
                index: i,
                frequency_khz: frequency,
            });
            return Ok(true);
        }
        self.frequency_index = frequencies.len();
        Ok(false)
    }

    /// Controller snapshot with the sweep fields filled in.
    pub fn status(&self, sequence: StateId) -> ControllerStatus {
        ControllerStatus {
            sequence,
            frequency_index: self.frequency_index,
            ..self.controller.status()
        }
    }
}
