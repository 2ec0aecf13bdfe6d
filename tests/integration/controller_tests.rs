//! Controller tests against recording mock instruments.

use std::time::Duration;

use oncolysis::app::events::ConnectionState;
use oncolysis::app::ports::{AcceptSimulation, Clock, SignalSource};
use oncolysis::app::transmit::TransmitChannel;
use oncolysis::error::Error;
use oncolysis::waveform::BurstUpdate;

use crate::mock_hw::{
    MockSource, SourceCall, SwitchCall, output_on, rig, rig_with, test_config,
};

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

// ── Connection ────────────────────────────────────────────────

#[test]
fn open_runs_handshake_in_order() {
    let (mut c, rig) = rig();
    c.open().unwrap();

    let calls = rig.source.snapshot();
    assert_eq!(calls[0], SourceCall::Open);
    assert_eq!(calls[1], SourceCall::SetOutput(false));
    assert!(matches!(calls[2], SourceCall::ApplyWaveform(_)));
    assert!(matches!(calls[3], SourceCall::SetBurst(_)));
    assert_eq!(rig.switch.snapshot(), vec![SwitchCall::Open]);
    assert_eq!(c.connection_state(), ConnectionState::Connected);
    assert!(c.is_ready());
}

#[test]
fn open_twice_is_a_no_op() {
    let (mut c, rig) = rig();
    c.open().unwrap();
    let n = rig.source.len();
    c.open().unwrap();
    assert_eq!(rig.source.len(), n);
}

#[test]
fn declined_fallback_leaves_controller_connected_with_error() {
    let mut source = MockSource::new();
    source.open_error = Some(Error::DeviceNotFound("VID=1AB1".into()));
    let (mut c, rig) = rig_with(test_config(), source);

    c.open().unwrap();
    assert_eq!(c.connection_state(), ConnectionState::ConnectedWithError);
    assert!(c.is_connected());
    assert!(!c.is_ready());
    assert!(!c.is_simulated());
    assert_eq!(c.start_treatment(true), Err(Error::NotReady));
    assert_eq!(c.set_frequency(100), Err(Error::NotReady));
    assert!(rig.switch.is_empty());

    // Cleared only by close/reopen.
    c.close().unwrap();
    assert_eq!(c.connection_state(), ConnectionState::Disconnected);
}

#[test]
fn accepted_fallback_switches_to_simulation() {
    let mut source = MockSource::new();
    source.open_error = Some(Error::Io("no such port".into()));
    let (c, rig) = rig_with(test_config(), source);
    let mut c = c.with_fallback(Box::new(AcceptSimulation));

    c.open().unwrap();
    assert!(c.is_simulated());
    assert!(c.is_ready());

    rig.source.clear();
    c.set_frequency(100).unwrap();
    c.start_treatment(true).unwrap();
    assert!(rig.source.is_empty());
}

#[test]
fn non_connection_failure_propagates() {
    let mut source = MockSource::new();
    source.open_error = Some(Error::Protocol("garbled *IDN?".into()));
    let (mut c, _rig) = rig_with(test_config(), source);

    assert!(matches!(c.open(), Err(Error::Protocol(_))));
    assert_eq!(c.connection_state(), ConnectionState::Disconnected);
}

#[test]
fn close_attempts_every_adapter_and_reports_first_error() {
    let mut source = MockSource::new();
    source.close_error = Some(Error::Io("stuck".into()));
    let (mut c, rig) = rig_with(test_config(), source);
    c.open().unwrap();

    assert_eq!(c.close(), Err(Error::Io("stuck".into())));
    assert!(rig.switch.snapshot().contains(&SwitchCall::Close));
    assert!(c.is_connected());
}

#[test]
fn close_when_disconnected_warns_only() {
    let (mut c, rig) = rig();
    c.close().unwrap();
    assert!(rig.source.is_empty());
}

#[test]
fn simulate_changes_only_while_disconnected() {
    let (mut c, _rig) = rig();
    c.set_simulate(true).unwrap();
    c.open().unwrap();
    assert!(c.set_simulate(false).is_err());
}

// ── Transmission ──────────────────────────────────────────────

#[test]
fn set_frequency_routes_then_programs_source() {
    let (mut c, rig) = rig();
    c.open().unwrap();
    rig.source.clear();

    c.set_frequency(100).unwrap();

    // 100 kHz is the second throw on the in vitro switch.
    assert_eq!(rig.switch.snapshot().last(), Some(&SwitchCall::SetPosition(2)));
    let cycles = oncolysis::dose::burst_cycles(c.burst_length_s(), 100);
    assert_eq!(cycles, 4000);
    assert_eq!(
        rig.source.snapshot(),
        vec![
            SourceCall::SetFrequency(100_000.0),
            SourceCall::SetVoltage(c.voltage_vpp()),
            SourceCall::SetBurst(BurstUpdate::timing(cycles, c.parameters().burst_period_s())),
            SourceCall::Settings,
            SourceCall::Burst,
        ]
    );
    assert_eq!(c.frequency_khz(), Some(100));
    assert!(c.voltage_vpp() > 0.0 && c.voltage_vpp() < 1.5);
}

#[test]
fn uncalibrated_frequency_is_rejected() {
    let (mut c, _rig) = rig();
    c.open().unwrap();
    assert_eq!(c.set_frequency(123), Err(Error::MissingCalibration(123)));
}

#[test]
fn voltage_above_ceiling_never_reaches_the_source() {
    let config = oncolysis::config::SystemConfig {
        max_voltage_vpp: 0.5,
        ..test_config()
    };
    let (mut c, rig) = rig_with(config, MockSource::new());
    c.open().unwrap();
    rig.source.clear();

    let err = c.set_frequency(100).unwrap_err();
    assert!(matches!(
        err,
        Error::SafetyLimitExceeded {
            quantity: "voltage",
            ..
        }
    ));
    assert!(rig.source.is_empty());
    assert_eq!(c.frequency_khz(), None);
}

#[test]
fn transmit_guard_records_zero_calls_over_limit() {
    let source = MockSource::new();
    let log = source.log();
    let mut channel = TransmitChannel::new(Box::new(source), 1.5);

    assert!(matches!(
        channel.set_voltage(2.0),
        Err(Error::SafetyLimitExceeded { .. })
    ));
    assert!(log.is_empty());

    channel.set_voltage(1.5).unwrap();
    assert_eq!(log.snapshot(), vec![SourceCall::SetVoltage(1.5)]);
}

#[test]
fn simulation_makes_no_adapter_calls() {
    let (c, rig) = rig();
    let mut c = c.with_simulate(true);
    c.open().unwrap();
    c.set_frequency(150).unwrap();
    c.start_treatment(true).unwrap();
    rig.clock.advance(secs(2));
    c.stop_treatment(true, None).unwrap();
    c.close().unwrap();

    assert!(rig.source.is_empty());
    assert!(rig.switch.is_empty());
}

#[test]
fn set_pressure_requires_ready_then_reprograms_voltage() {
    let (mut c, rig) = rig();
    assert_eq!(c.set_pressure(80.0), Err(Error::NotReady));

    c.open().unwrap();
    c.set_frequency(100).unwrap();
    let full = c.voltage_vpp();
    rig.source.clear();

    c.set_pressure(80.0).unwrap();
    assert!(c.voltage_vpp() < full);
    assert_eq!(rig.source.snapshot(), vec![SourceCall::SetVoltage(c.voltage_vpp())]);
    assert_eq!(c.parameters().power_value, 80.0);
}

#[test]
fn out_of_range_power_value_is_rejected() {
    let (mut c, _rig) = rig();
    assert!(c.set_power_value(250.0).is_err());
    assert_eq!(c.parameters().power_value, 100.0);
}

// ── Treatment timing ──────────────────────────────────────────

#[test]
fn pause_and_resume_preserve_elapsed_time() {
    let (mut c, rig) = rig();
    c.open().unwrap();
    c.set_frequency(100).unwrap();

    c.start_treatment(true).unwrap();
    assert!(output_on(&rig.source.snapshot()));
    rig.clock.advance(secs(3));

    c.stop_treatment(false, None).unwrap();
    assert!(!output_on(&rig.source.snapshot()));
    rig.clock.advance(secs(10));
    assert_eq!(c.check_treatment_time(), secs(3));

    c.start_treatment(false).unwrap();
    rig.clock.advance(secs(2));
    assert_eq!(c.check_treatment_time(), secs(5));

    c.stop_treatment(true, None).unwrap();
    assert_eq!(c.check_treatment_time(), Duration::ZERO);
}

#[test]
fn stop_with_wait_blocks_until_target() {
    let (mut c, rig) = rig();
    c.open().unwrap();
    c.set_frequency(100).unwrap();
    c.start_treatment(true).unwrap();
    rig.clock.advance(secs(1));

    c.stop_treatment(true, Some(secs(5))).unwrap();
    assert_eq!(rig.clock.now(), secs(5));
    assert!(!c.is_treating());
}

#[test]
fn start_and_stop_warn_when_redundant() {
    let (mut c, rig) = rig();
    c.open().unwrap();
    c.stop_treatment(true, None).unwrap();
    c.start_treatment(true).unwrap();
    let n = rig.source.len();
    c.start_treatment(true).unwrap();
    assert_eq!(rig.source.len(), n);
}

#[test]
fn close_stops_an_active_treatment() {
    let (mut c, rig) = rig();
    c.open().unwrap();
    c.set_frequency(100).unwrap();
    c.start_treatment(true).unwrap();

    c.close().unwrap();
    assert!(!c.is_treating());
    assert!(!output_on(&rig.source.snapshot()));
    assert!(rig.source.snapshot().contains(&SourceCall::Close));
}

// ── Reporting ─────────────────────────────────────────────────

#[test]
fn dose_report_covers_every_profile_frequency() {
    let (c, _rig) = rig();
    let report = c.dose_report();
    assert_eq!(report.len(), c.profile().frequencies_khz.len());
    for (f, dose) in report {
        let dose = dose.unwrap();
        assert_eq!(dose.frequency_khz, f);
        assert!(dose.input_voltage > 0.0);
    }
}

#[test]
fn status_reflects_connection_and_frequency() {
    let (mut c, _rig) = rig();
    c.open().unwrap();
    c.set_frequency(150).unwrap();
    let s = c.status();
    assert_eq!(s.connection, ConnectionState::Connected);
    assert!(s.ready);
    assert_eq!(s.frequency_khz, Some(150));
    assert_eq!(s.voltage_vpp, c.voltage_vpp());
}

#[test]
fn source_trait_object_is_send() {
    fn assert_send<T: Send>(_: &T) {}
    let s: Box<dyn SignalSource> = Box::new(MockSource::new());
    assert_send(&s);
}
