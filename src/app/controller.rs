//! Treatment controller: the hexagonal core.
//!
//! [`Controller`] owns the treatment parameters, the hardware connection
//! state and the elapsed-time accounting.  All instrument I/O flows through
//! port traits handed over at construction, so the controller runs unchanged
//! against real instruments, mocks, or nothing at all (simulation).
//!
//! ```text
//!  SignalSource ◀── TransmitChannel ◀──┐
//!                                      │  ┌───────────────────────────┐
//!  RoutingSwitch × N ◀─────────────────┼──│        Controller         │
//!                                      │  │ params · dose · clock     │
//!  Clock ──────────────────────────────┘  └───────────────────────────┘
//! ```
//!
//! The controller is not thread-safe by itself; the
//! [`ControlQueue`](super::queue::ControlQueue) moves it onto a single
//! worker thread.

use std::time::Duration;

use log::{error, info, warn};

use crate::config::SystemConfig;
use crate::dose::{self, FrequencyDose, PowerMode};
use crate::error::{Error, Result};
use crate::fsm::StateId;
use crate::profile::Profile;
use crate::safety::{self, SafetyMonitor};
use crate::waveform::BurstUpdate;

use super::events::{ConnectionState, ControllerStatus};
use super::parameters::{self, TreatmentParameters};
use super::ports::{Clock, DeclineSimulation, RoutingSwitch, SignalSource, SimulationFallback};
use super::transmit::TransmitChannel;
use super::treatment_clock::TreatmentClock;

/// The instruments a controller drives.
pub struct Instruments {
    pub source: Box<dyn SignalSource>,
    /// RF switches in chain order (matching the profile's switch serials).
    pub switches: Vec<Box<dyn RoutingSwitch>>,
}

// ───────────────────────────────────────────────────────────────
// Controller
// ───────────────────────────────────────────────────────────────

pub struct Controller {
    config: SystemConfig,
    profile: Profile,
    params: TreatmentParameters,

    transmit: TransmitChannel,
    switches: Vec<Box<dyn RoutingSwitch>>,
    clock: Box<dyn Clock>,
    fallback: Box<dyn SimulationFallback>,
    safety: SafetyMonitor,

    connection: ConnectionState,
    simulate: bool,

    /// Frequency currently programmed (kHz).
    frequency_khz: Option<u32>,
    /// Source amplitude for the current frequency (Vpp).
    voltage_vpp: f64,
    /// Burst length actually transmitted (s), after dose adjustment.
    burst_length_s: f64,

    treating: bool,
    timer: TreatmentClock,
}

impl Controller {
    /// Build a disconnected controller.  Parameters start at the profile
    /// defaults with every profile frequency selected.
    pub fn new(
        config: SystemConfig,
        profile: Profile,
        instruments: Instruments,
        clock: Box<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        profile.validate()?;
        let params = TreatmentParameters::from_profile(&profile, config.default_power_mode);
        let burst_length_s = params.burst_length_s;
        let transmit = TransmitChannel::new(instruments.source, config.max_voltage_vpp);

        Ok(Self {
            config,
            profile,
            params,
            transmit,
            switches: instruments.switches,
            clock,
            fallback: Box::new(DeclineSimulation),
            safety: SafetyMonitor::new(),
            connection: ConnectionState::Disconnected,
            simulate: false,
            frequency_khz: None,
            voltage_vpp: 0.0,
            burst_length_s,
            treating: false,
            timer: TreatmentClock::new(),
        })
    }

    /// Policy consulted when the hardware handshake cannot connect.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Box<dyn SimulationFallback>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Start in simulation: no adapter is ever called.
    #[must_use]
    pub fn with_simulate(mut self, simulate: bool) -> Self {
        self.simulate = simulate;
        self
    }

    // ── Connection ────────────────────────────────────────────

    /// Connect to the instruments.
    ///
    /// A handshake that cannot reach the hardware is offered to the
    /// [`SimulationFallback`]; declining leaves the controller
    /// connected-with-error (not ready) until the next close/reopen.
    pub fn open(&mut self) -> Result<()> {
        if self.connection != ConnectionState::Disconnected {
            warn!("OPEN | already connected");
            return Ok(());
        }
        if self.simulate {
            self.connection = ConnectionState::Connected;
            info!("OPEN | simulation, no hardware contacted");
            return Ok(());
        }

        match self.handshake() {
            Ok(()) => {
                self.connection = ConnectionState::Connected;
                info!("OPEN | instruments connected");
                Ok(())
            }
            Err(e) => {
                if let Err(cleanup) = self.release_instruments() {
                    warn!("OPEN | cleanup after failed handshake: {cleanup}");
                }
                if !e.is_connection_failure() {
                    error!("OPEN | handshake failed: {e}");
                    return Err(e);
                }
                if self.fallback.offer_simulation(&e) {
                    warn!("OPEN | could not connect to hardware ({e}), continuing in simulation");
                    self.simulate = true;
                    self.connection = ConnectionState::Connected;
                } else {
                    error!("OPEN | could not connect to hardware: {e}");
                    self.connection = ConnectionState::ConnectedWithError;
                }
                Ok(())
            }
        }
    }

    /// Release the instruments.  Every adapter is attempted; the first
    /// failure is returned and the controller stays connected.
    pub fn close(&mut self) -> Result<()> {
        if self.connection == ConnectionState::Disconnected {
            warn!("CLOSE | already disconnected");
            return Ok(());
        }
        if self.treating {
            if let Err(e) = self.stop_treatment(true, None) {
                warn!("CLOSE | stopping treatment: {e}");
            }
            self.treating = false;
        }
        if !self.simulate {
            self.release_instruments()?;
        }
        self.connection = ConnectionState::Disconnected;
        self.frequency_khz = None;
        self.update_voltage()?;
        info!("CLOSE | disconnected");
        Ok(())
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection != ConnectionState::Disconnected
    }

    /// Connected without error and with at least one frequency selected.
    pub fn is_ready(&self) -> bool {
        self.connection == ConnectionState::Connected && !self.params.frequencies_khz.is_empty()
    }

    pub fn is_simulated(&self) -> bool {
        self.simulate
    }

    /// Toggle simulation.  Only allowed while disconnected.
    pub fn set_simulate(&mut self, simulate: bool) -> Result<()> {
        if self.is_connected() {
            return Err(Error::InvalidConfiguration(
                "simulation can only change while disconnected".into(),
            ));
        }
        self.simulate = simulate;
        info!("PARAM | simulate = {simulate}");
        Ok(())
    }

    // ── Parameters ────────────────────────────────────────────

    pub fn parameters(&self) -> &TreatmentParameters {
        &self.params
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn set_frequencies(&mut self, frequencies_khz: Vec<u32>) -> Result<()> {
        parameters::validate_frequencies(&frequencies_khz)?;
        info!("PARAM | frequencies = {frequencies_khz:?} kHz");
        self.params.frequencies_khz = frequencies_khz;
        Ok(())
    }

    pub fn set_power_mode(&mut self, mode: PowerMode) -> Result<()> {
        info!("PARAM | power mode = {mode}");
        self.update_parameters(|p| p.power_mode = mode)
    }

    pub fn set_power_value(&mut self, value: f64) -> Result<()> {
        let settings = self.params.power_mode.settings();
        settings.validate(value)?;
        info!("PARAM | power = {value} {}", settings.units);
        self.update_parameters(|p| p.power_value = value)
    }

    /// Store a new power value and reprogram the source voltage at once.
    pub fn set_pressure(&mut self, value: f64) -> Result<()> {
        if !self.is_ready() {
            return Err(Error::NotReady);
        }
        self.set_power_value(value)?;
        if !self.simulate {
            self.transmit.set_voltage(self.voltage_vpp)?;
        }
        Ok(())
    }

    pub fn set_burst_length(&mut self, burst_length_s: f64) -> Result<()> {
        parameters::validate_burst_length(burst_length_s)?;
        info!("PARAM | burst length = {burst_length_s} s");
        self.update_parameters(|p| p.burst_length_s = burst_length_s)
    }

    pub fn set_duty_cycle(&mut self, duty_cycle: f64) -> Result<()> {
        parameters::validate_duty_cycle(duty_cycle)?;
        info!("PARAM | duty cycle = {duty_cycle}");
        self.update_parameters(|p| p.duty_cycle = duty_cycle)
    }

    pub fn set_duration(&mut self, duration: Duration) -> Result<()> {
        parameters::validate_duration(duration)?;
        info!("PARAM | duration = {}", dose::format_clock(duration.as_secs_f64()));
        self.params.duration = duration;
        Ok(())
    }

    // ── Transmission ──────────────────────────────────────────

    /// Route and program the source for `frequency_khz`.
    pub fn set_frequency(&mut self, frequency_khz: u32) -> Result<()> {
        if !self.is_ready() {
            return Err(Error::NotReady);
        }
        self.profile.calibration.entry(frequency_khz)?;

        let previous = self.frequency_khz.replace(frequency_khz);
        let computed = self
            .update_voltage()
            .and_then(|()| safety::check_voltage(self.voltage_vpp, self.config.max_voltage_vpp));
        if let Err(e) = computed {
            self.frequency_khz = previous;
            if let Err(restore) = self.update_voltage() {
                warn!("XMIT | restoring {previous:?} kHz: {restore}");
            }
            return Err(e);
        }

        let cycles = dose::burst_cycles(self.burst_length_s, frequency_khz);
        let period = self.params.burst_period_s();
        info!(
            "XMIT | {frequency_khz} kHz: {:.4} Vpp ({:.2} V amplified), {cycles} cycles every {period:.4} s",
            self.voltage_vpp,
            self.voltage_vpp * self.config.amplifier_gain
        );
        if self.simulate {
            return Ok(());
        }

        self.route(frequency_khz)?;
        self.transmit.set_frequency(f64::from(frequency_khz) * 1e3)?;
        self.transmit.set_voltage(self.voltage_vpp)?;
        self.transmit.set_burst(&BurstUpdate::timing(cycles, period))?;
        self.transmit.verify()?;
        Ok(())
    }

    pub fn frequency_khz(&self) -> Option<u32> {
        self.frequency_khz
    }

    pub fn voltage_vpp(&self) -> f64 {
        self.voltage_vpp
    }

    /// Burst length actually transmitted (s).
    pub fn burst_length_s(&self) -> f64 {
        self.burst_length_s
    }

    /// Dose-warning bitmask for the active frequency.
    pub fn warnings(&self) -> u8 {
        self.safety.warnings()
    }

    // ── Treatment timing ──────────────────────────────────────

    /// Enable the output and start (or resume) the treatment clock.
    pub fn start_treatment(&mut self, reset_timer: bool) -> Result<()> {
        if !self.is_ready() {
            return Err(Error::NotReady);
        }
        if self.treating {
            warn!("TREAT | already treating");
            return Ok(());
        }
        if !self.simulate {
            self.transmit.set_output_enabled(true)?;
        }
        self.timer.start(self.clock.now(), reset_timer);
        self.treating = true;
        info!(
            "TREAT | output on at {:?} kHz, elapsed {}",
            self.frequency_khz,
            dose::format_clock(self.check_treatment_time().as_secs_f64())
        );
        Ok(())
    }

    /// Disable the output.  With `wait_for`, first block until that much
    /// treatment time has elapsed.
    pub fn stop_treatment(&mut self, reset_timer: bool, wait_for: Option<Duration>) -> Result<()> {
        if !self.treating {
            warn!("TREAT | not treating");
            return Ok(());
        }
        if let Some(target) = wait_for {
            let elapsed = self.check_treatment_time();
            if target > elapsed {
                self.clock.sleep(target - elapsed);
            }
        }
        if !self.simulate {
            self.transmit.set_output_enabled(false)?;
        }

        let now = self.clock.now();
        self.timer.pause(now);
        let elapsed = self.timer.elapsed(now);
        if reset_timer {
            self.timer.reset(now);
        }
        self.treating = false;
        info!(
            "TREAT | output off after {}{}",
            dose::format_clock(elapsed.as_secs_f64()),
            if reset_timer { ", timer reset" } else { "" }
        );
        Ok(())
    }

    /// Elapsed treatment time; a pure read.
    pub fn check_treatment_time(&self) -> Duration {
        self.timer.elapsed(self.clock.now())
    }

    pub fn is_treating(&self) -> bool {
        self.treating
    }

    /// Block the calling thread on the controller's clock.
    pub fn wait(&self, duration: Duration) {
        self.clock.sleep(duration);
    }

    // ── Reporting ─────────────────────────────────────────────

    /// Dose metrics for every profile frequency under the current parameters.
    pub fn dose_report(&self) -> Vec<(u32, Result<FrequencyDose>)> {
        let request = self.params.dose_request();
        self.profile
            .frequencies_khz
            .iter()
            .map(|&f| {
                let dose = dose::evaluate_frequency(
                    f,
                    &request,
                    &self.profile.calibration,
                    self.config.amplifier_gain,
                );
                (f, dose)
            })
            .collect()
    }

    /// Snapshot of the controller.  Sequence fields are filled by the worker.
    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            connection: self.connection,
            simulate: self.simulate,
            ready: self.is_ready(),
            treating: self.treating,
            frequency_khz: self.frequency_khz,
            voltage_vpp: self.voltage_vpp,
            sequence: StateId::Idle,
            frequency_index: 0,
            elapsed: self.check_treatment_time(),
            warnings: self.safety.warnings(),
        }
    }

    // ── Internal ──────────────────────────────────────────────

    fn handshake(&mut self) -> Result<()> {
        self.transmit.open()?;
        self.transmit.set_output_enabled(false)?;
        self.transmit.apply_waveform(&self.config.source_template)?;
        self.transmit.set_burst(&self.config.burst_template)?;
        for switch in &mut self.switches {
            switch.open()?;
        }
        Ok(())
    }

    fn release_instruments(&mut self) -> Result<()> {
        let mut first_error = None;
        if self.transmit.is_open() {
            if let Err(e) = self.transmit.close() {
                error!("CLOSE | signal source: {e}");
                first_error = Some(e);
            }
        }
        for switch in &mut self.switches {
            if !switch.is_open() {
                continue;
            }
            if let Err(e) = switch.close() {
                error!("CLOSE | {}: {e}", switch.label());
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn route(&mut self, frequency_khz: u32) -> Result<()> {
        let Some(positions) = self.profile.positions_for(frequency_khz) else {
            warn!("ROUTE | {frequency_khz} kHz has no switch positions, RF routing skipped");
            return Ok(());
        };
        if positions.len() != self.switches.len() {
            warn!(
                "ROUTE | {} positions for {} switches",
                positions.len(),
                self.switches.len()
            );
        }
        for (switch, position) in self.switches.iter_mut().zip(positions.iter()) {
            switch.set_position(*position)?;
        }
        Ok(())
    }

    /// Recompute voltage and burst length for the current frequency.
    fn update_voltage(&mut self) -> Result<()> {
        let Some(frequency) = self.frequency_khz else {
            self.voltage_vpp = 0.0;
            self.burst_length_s = self.params.burst_length_s;
            self.safety.clear();
            return Ok(());
        };
        let dose = dose::evaluate_frequency(
            frequency,
            &self.params.dose_request(),
            &self.profile.calibration,
            self.config.amplifier_gain,
        )?;
        self.safety.evaluate(&dose);
        self.voltage_vpp = dose.input_voltage;
        self.burst_length_s = dose.burst_length_s;
        info!(
            "DOSE | {frequency} kHz: {:.1} kPa, MI {:.2}, {:.4} Vpp",
            dose.pressure_kpa, dose.mechanical_index, dose.input_voltage
        );
        Ok(())
    }

    /// Apply a parameter change, rolling it back if the dose no longer
    /// solves for the active frequency.
    fn update_parameters(&mut self, change: impl FnOnce(&mut TreatmentParameters)) -> Result<()> {
        let previous = self.params.clone();
        change(&mut self.params);
        if let Err(e) = self.update_voltage() {
            self.params = previous;
            if let Err(restore) = self.update_voltage() {
                warn!("PARAM | restoring previous parameters: {restore}");
            }
            return Err(e);
        }
        Ok(())
    }
}
