//! Serial adapters against a fake SCPI instrument and fake USB scanner.

use std::time::Duration;

use oncolysis::adapters::discovery::UsbPort;
use oncolysis::adapters::function_generator::FunctionGenerator;
use oncolysis::adapters::rf_switch::RfSwitch;
use oncolysis::app::ports::{RoutingSwitch, SignalSource};
use oncolysis::error::Error;
use oncolysis::waveform::{
    BurstMode, GatePolarity, TriggerOut, TriggerSlope, TriggerSource, Waveform,
};

use crate::mock_hw::{FakeConnector, FakeInstrument, FakeScanner, test_config, usb_port};

const FGEN_VID: u16 = 0x1AB1;
const FGEN_PID: u16 = 0x0641;
const SWITCH_VID: u16 = 0x10C4;
const SWITCH_PID: u16 = 0xEA71;

fn fgen(instrument: &FakeInstrument) -> FunctionGenerator {
    let scanner = FakeScanner(vec![
        usb_port("/dev/ttyUSB0", SWITCH_VID, SWITCH_PID, Some("SN1")),
        usb_port("/dev/ttyACM0", FGEN_VID, FGEN_PID, None),
    ]);
    FunctionGenerator::new(
        &test_config(),
        Box::new(scanner),
        Box::new(FakeConnector::new(instrument.clone())),
    )
}

// ── Function generator ────────────────────────────────────────

#[test]
fn fgen_open_discovers_and_identifies() {
    let instrument = FakeInstrument::new();
    let mut fg = fgen(&instrument);

    fg.open().unwrap();
    assert!(fg.is_open());
    assert_eq!(fg.identity(), "FAKE,DG4162,0001,1.0");
    assert_eq!(instrument.written.snapshot(), vec!["*IDN?".to_string()]);
}

#[test]
fn fgen_open_without_device_is_not_found() {
    let mut fg = FunctionGenerator::new(
        &test_config(),
        Box::new(FakeScanner(vec![])),
        Box::new(FakeConnector::new(FakeInstrument::new())),
    );
    let err = fg.open().unwrap_err();
    assert!(matches!(err, Error::DeviceNotFound(_)));
    assert!(err.is_connection_failure());
    assert!(!fg.is_open());
}

#[test]
fn fgen_programs_transmit_channel() {
    let instrument = FakeInstrument::new();
    let mut fg = fgen(&instrument);
    fg.open().unwrap();
    instrument.written.clear();

    fg.set_frequency(100_000.0).unwrap();
    fg.set_voltage(0.25).unwrap();
    fg.set_output_enabled(true).unwrap();

    assert_eq!(
        instrument.written.snapshot(),
        vec![
            "SOURCE1:FREQUENCY:FIXED 100000".to_string(),
            "SOURCE1:VOLTAGE:LEVEL:IMMEDIATE:AMPLITUDE 0.25".to_string(),
            "OUTPUT1:STAT ON".to_string(),
        ]
    );
}

#[test]
fn fgen_close_disables_every_channel() {
    let instrument = FakeInstrument::new();
    let mut fg = fgen(&instrument);
    fg.open().unwrap();
    instrument.written.clear();

    fg.close().unwrap();
    assert!(!fg.is_open());
    assert_eq!(
        instrument.written.snapshot(),
        vec!["OUTPUT1:STAT OFF".to_string(), "OUTPUT2:STAT OFF".to_string()]
    );

    // Already closed: nothing written.
    fg.close().unwrap();
    assert_eq!(instrument.written.len(), 2);
}

#[test]
fn fgen_close_failure_resets_and_reports() {
    let mut instrument = FakeInstrument::new();
    instrument.fail_prefix = Some("OUTPUT1".into());
    let mut fg = fgen(&instrument);
    fg.open().unwrap();

    assert!(matches!(fg.close(), Err(Error::Io(_))));
    assert_eq!(instrument.written.snapshot().last(), Some(&"*RST".to_string()));
    assert!(fg.is_open());
}

#[test]
fn fgen_reads_back_settings_and_burst() {
    let instrument = FakeInstrument::new();
    instrument.respond("SOURCE1:APPLY?", "\"SIN,100000,0.6,0,0\"");
    for (attr, value) in [
        ("STAT", "ON"),
        ("INTERNAL:PERIOD", "0.4"),
        ("MODE", "TRIG"),
        ("NCYCLES", "4000"),
        ("PHASE", "0"),
        ("TDELAY", "0"),
        ("TRIG:SLOPE", "NEG"),
        ("TRIG:SOURCE", "INT"),
        ("TRIG:TRIGOUT", "POS"),
        ("GATE:POL", "INV"),
    ] {
        instrument.respond(&format!("SOURCE1:BURST:{attr}?"), value);
    }
    let mut fg = fgen(&instrument);
    fg.open().unwrap();

    let settings = fg.settings().unwrap();
    assert_eq!(settings.waveform, Waveform::Sine);
    assert_eq!(settings.frequency_hz, 100_000.0);
    assert_eq!(settings.amplitude_vpp, 0.6);

    let burst = fg.burst().unwrap();
    assert!(burst.enabled);
    assert_eq!(burst.cycles, 4000);
    assert_eq!(burst.period_s, 0.4);
    assert_eq!(burst.mode, BurstMode::Triggered);
    assert_eq!(burst.trigger_source, TriggerSource::Internal);
    assert_eq!(burst.trigger_out, TriggerOut::Positive);
    assert_eq!(burst.trigger_slope, TriggerSlope::Negative);
    assert_eq!(burst.gate_polarity, GatePolarity::Inverted);
}

#[test]
fn fgen_burst_template_sets_slope_and_gate_polarity() {
    let instrument = FakeInstrument::new();
    let mut fg = fgen(&instrument);
    fg.open().unwrap();
    instrument.written.clear();

    fg.set_burst(&test_config().burst_template).unwrap();
    assert_eq!(
        instrument.written.snapshot(),
        [
            "SOURCE1:BURST:STATE ON",
            "SOURCE1:BURST:INTERNAL:PERIOD 0.1",
            "SOURCE1:BURST:MODE TRIG",
            "SOURCE1:BURST:NCYCLES 1",
            "SOURCE1:BURST:PHASE 0",
            "SOURCE1:BURST:TDELAY 0",
            "SOURCE1:BURST:TRIG:SLOPE POSITIVE",
            "SOURCE1:BURST:TRIG:SOURCE INT",
            "SOURCE1:BURST:TRIG:TRIGOUT POS",
            "SOURCE1:BURST:GATE:POL NORM",
        ]
        .map(String::from)
    );
}

#[test]
fn fgen_commands_need_a_connection() {
    let mut fg = fgen(&FakeInstrument::new());
    assert_eq!(fg.set_output_enabled(true), Err(Error::NotReady));
}

// ── RF switch ─────────────────────────────────────────────────

fn switch(ports: Vec<UsbPort>, instrument: &FakeInstrument) -> RfSwitch {
    RfSwitch::new(
        &test_config(),
        Some("SN1"),
        Box::new(FakeScanner(ports)),
        Box::new(FakeConnector::new(instrument.clone())),
    )
    .with_settle_time(Duration::ZERO)
}

#[test]
fn switch_discovers_by_serial_number() {
    let ports = vec![
        usb_port("/dev/ttyUSB0", SWITCH_VID, SWITCH_PID, Some("SN0")),
        usb_port("/dev/ttyUSB1", SWITCH_VID, SWITCH_PID, Some("SN1")),
    ];
    let mut sw = switch(ports, &FakeInstrument::new());
    assert_eq!(sw.label(), "switch SN1");

    sw.open().unwrap();
    assert_eq!(sw.port(), Some("/dev/ttyUSB1"));
    assert_eq!(
        sw.port_info().and_then(|p| p.serial_number.as_deref()),
        Some("SN1")
    );
    assert_eq!(sw.label(), "/dev/ttyUSB1");
}

#[test]
fn switch_discovery_rejects_missing_and_duplicate_devices() {
    let mut missing = switch(vec![], &FakeInstrument::new());
    assert!(matches!(missing.open(), Err(Error::DeviceNotFound(_))));

    let twins = vec![
        usb_port("/dev/ttyUSB0", SWITCH_VID, SWITCH_PID, Some("SN1")),
        usb_port("/dev/ttyUSB1", SWITCH_VID, SWITCH_PID, Some("SN1")),
    ];
    let mut ambiguous = switch(twins, &FakeInstrument::new());
    assert!(matches!(
        ambiguous.open(),
        Err(Error::AmbiguousDevice { count: 2, .. })
    ));
    assert!(!ambiguous.is_open());
}

#[test]
fn switch_position_is_written_and_verified() {
    let instrument = FakeInstrument::new();
    let ports = vec![usb_port("/dev/ttyUSB1", SWITCH_VID, SWITCH_PID, Some("SN1"))];
    let mut sw = switch(ports, &instrument);
    sw.open().unwrap();

    sw.set_position(3).unwrap();
    assert_eq!(sw.last_position(), Some(3));
    assert_eq!(sw.position().unwrap(), 3);
    assert_eq!(
        instrument.written.snapshot()[..2],
        ["ROUT:CLOS 3".to_string(), "ROUT:CLOS?".to_string()]
    );
}

#[test]
fn switch_read_back_mismatch_fails_verification() {
    let mut instrument = FakeInstrument::new();
    instrument.stuck_at = Some(1);
    let ports = vec![usb_port("/dev/ttyUSB1", SWITCH_VID, SWITCH_PID, Some("SN1"))];
    let mut sw = switch(ports, &instrument);
    sw.open().unwrap();

    assert_eq!(
        sw.set_position(4),
        Err(Error::Verification {
            device: "/dev/ttyUSB1".into(),
            expected: "4".into(),
            actual: "1".into(),
        })
    );
    assert_eq!(sw.last_position(), None);
}

#[test]
fn switch_close_is_idempotent() {
    let ports = vec![usb_port("/dev/ttyUSB1", SWITCH_VID, SWITCH_PID, Some("SN1"))];
    let mut sw = switch(ports, &FakeInstrument::new()).with_port("/dev/ttyS9");
    sw.open().unwrap();
    assert!(sw.port_info().is_none());
    sw.close().unwrap();
    sw.close().unwrap();
    assert!(!sw.is_open());
    assert_eq!(sw.set_position(1), Err(Error::NotReady));
}
