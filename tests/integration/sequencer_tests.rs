//! Sequencer tests: commands and polls applied synchronously on the test
//! thread, with virtual time.

use std::time::Duration;

use oncolysis::app::commands::ControlCommand;
use oncolysis::app::events::ControlEvent;
use oncolysis::app::ports::Clock;
use oncolysis::app::sequencer::{Flow, Sequencer};
use oncolysis::error::Error;
use oncolysis::fsm::StateId;
use oncolysis::fsm::context::{SweepContext, TREATMENT_COMPLETE};

use crate::mock_hw::{RecordingNotifier, Rig, SourceCall, output_on, rig};

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

/// Sequencer over the mock rig, opened, with `frequencies` at 5 s each.
fn opened(frequencies: Vec<u32>) -> (Sequencer, Rig, RecordingNotifier) {
    let (controller, rig) = rig();
    let notifier = RecordingNotifier::new();
    let mut seq = Sequencer::new(SweepContext::new(controller, Box::new(notifier.clone())));
    seq.start();

    for cmd in [
        ControlCommand::SetFrequencies(frequencies),
        ControlCommand::SetDuration(secs(5)),
        ControlCommand::Open,
    ] {
        assert_eq!(seq.handle_command(cmd).unwrap(), Flow::Continue);
    }
    (seq, rig, notifier)
}

fn treating(index: usize, frequency_khz: u32) -> ControlEvent {
    ControlEvent::Treating {
        index,
        frequency_khz,
    }
}

// ── Sweep ─────────────────────────────────────────────────────

#[test]
fn open_notifies_status() {
    let (seq, _rig, notifier) = opened(vec![100]);
    let events = notifier.milestones();
    assert_eq!(events.len(), 1);
    match &events[0] {
        ControlEvent::Opened(status) => {
            assert!(status.ready);
            assert_eq!(status.sequence, StateId::Idle);
        }
        other => panic!("expected Opened, got {other:?}"),
    }
    assert_eq!(seq.state(), StateId::Idle);
}

#[test]
fn sweep_advances_through_every_frequency_then_ends() {
    let (mut seq, rig, notifier) = opened(vec![100, 150]);

    seq.handle_command(ControlCommand::Start).unwrap();
    assert_eq!(seq.state(), StateId::Running);
    assert!(output_on(&rig.source.snapshot()));

    seq.poll().unwrap();
    assert!(matches!(
        notifier.events.snapshot().last(),
        Some(ControlEvent::Waiting { elapsed, duration }) if *elapsed == Duration::ZERO && *duration == secs(5)
    ));

    rig.clock.advance(secs(5));
    seq.poll().unwrap();
    assert_eq!(seq.state(), StateId::Running);
    assert_eq!(seq.context().controller.frequency_khz(), Some(150));

    rig.clock.advance(secs(5));
    seq.poll().unwrap();
    assert_eq!(seq.state(), StateId::Idle);
    assert!(!seq.context().controller.is_treating());
    assert!(!output_on(&rig.source.snapshot()));

    let milestones = notifier.milestones();
    assert_eq!(
        milestones[1..],
        [
            treating(0, 100),
            treating(1, 150),
            ControlEvent::Ended(TREATMENT_COMPLETE.into()),
        ]
    );
}

#[test]
fn each_frequency_gets_the_full_duration() {
    let (mut seq, rig, _notifier) = opened(vec![100, 150]);
    seq.handle_command(ControlCommand::Start).unwrap();

    rig.clock.advance(Duration::from_millis(4999));
    seq.poll().unwrap();
    assert_eq!(seq.context().controller.frequency_khz(), Some(100));

    rig.clock.advance(Duration::from_millis(1));
    seq.poll().unwrap();
    assert_eq!(seq.context().controller.frequency_khz(), Some(150));
    assert_eq!(seq.context().controller.check_treatment_time(), Duration::ZERO);
}

#[test]
fn uncalibrated_frequencies_are_skipped() {
    let (mut seq, _rig, notifier) = opened(vec![123, 150]);
    seq.handle_command(ControlCommand::Start).unwrap();

    assert_eq!(seq.state(), StateId::Running);
    assert_eq!(notifier.milestones().last(), Some(&treating(1, 150)));
    assert_eq!(seq.status().frequency_index, 1);
}

#[test]
fn start_with_nothing_treatable_ends_immediately() {
    let (mut seq, rig, notifier) = opened(vec![123]);
    rig.source.clear();

    seq.handle_command(ControlCommand::Start).unwrap();
    assert_eq!(seq.state(), StateId::Idle);
    assert_eq!(
        notifier.milestones().last(),
        Some(&ControlEvent::Ended(TREATMENT_COMPLETE.into()))
    );
    assert!(!output_on(&rig.source.snapshot()));
}

#[test]
fn start_mid_sweep_restarts_the_timer() {
    let (mut seq, rig, notifier) = opened(vec![100, 150]);
    seq.handle_command(ControlCommand::Start).unwrap();
    rig.clock.advance(secs(4));
    seq.poll().unwrap();

    seq.handle_command(ControlCommand::Start).unwrap();
    assert_eq!(seq.state(), StateId::Running);
    assert_eq!(seq.context().controller.check_treatment_time(), Duration::ZERO);
    assert!(output_on(&rig.source.snapshot()));

    rig.clock.advance(secs(1));
    seq.poll().unwrap();
    assert_eq!(seq.context().controller.frequency_khz(), Some(100));

    rig.clock.advance(secs(4));
    seq.poll().unwrap();
    assert_eq!(seq.context().controller.frequency_khz(), Some(150));
    assert_eq!(
        notifier.milestones()[1..],
        [treating(0, 100), treating(0, 100), treating(1, 150)]
    );
}

#[test]
fn start_before_open_is_not_ready() {
    let (controller, _rig) = rig();
    let mut seq = Sequencer::new(SweepContext::new(
        controller,
        Box::new(RecordingNotifier::new()),
    ));
    seq.start();
    assert_eq!(seq.handle_command(ControlCommand::Start), Err(Error::NotReady));
    assert_eq!(seq.state(), StateId::Idle);
}

// ── Pause / resume / stop ─────────────────────────────────────

#[test]
fn pause_freezes_elapsed_time_and_resume_continues() {
    let (mut seq, rig, notifier) = opened(vec![100, 150]);
    seq.handle_command(ControlCommand::Start).unwrap();
    rig.clock.advance(secs(2));

    seq.handle_command(ControlCommand::Pause).unwrap();
    assert_eq!(seq.state(), StateId::Running);
    assert!(!output_on(&rig.source.snapshot()));

    rig.clock.advance(secs(60));
    seq.poll().unwrap();
    assert_eq!(
        notifier.events.snapshot().last(),
        Some(&ControlEvent::Waiting {
            elapsed: secs(2),
            duration: secs(5)
        })
    );
    assert_eq!(seq.context().controller.frequency_khz(), Some(100));

    seq.handle_command(ControlCommand::Resume).unwrap();
    assert!(output_on(&rig.source.snapshot()));
    rig.clock.advance(secs(3));
    seq.poll().unwrap();
    assert_eq!(notifier.milestones().last(), Some(&treating(1, 150)));
}

#[test]
fn stop_parks_the_sweep() {
    let (mut seq, rig, _notifier) = opened(vec![100, 150]);
    seq.handle_command(ControlCommand::Start).unwrap();
    rig.clock.advance(secs(1));

    seq.handle_command(ControlCommand::Stop).unwrap();
    assert_eq!(seq.state(), StateId::Idle);
    assert!(!seq.context().controller.is_treating());
    assert_eq!(seq.context().controller.check_treatment_time(), Duration::ZERO);

    // Polling while idle does nothing.
    rig.clock.advance(secs(30));
    seq.poll().unwrap();
    assert_eq!(seq.context().controller.frequency_khz(), Some(100));
}

#[test]
fn reset_rewinds_the_sweep() {
    let (mut seq, rig, _notifier) = opened(vec![100, 150]);
    seq.handle_command(ControlCommand::Start).unwrap();
    rig.clock.advance(secs(5));
    seq.poll().unwrap();
    assert_eq!(seq.status().frequency_index, 1);

    seq.handle_command(ControlCommand::Stop).unwrap();
    seq.handle_command(ControlCommand::Reset).unwrap();
    assert_eq!(seq.status().frequency_index, 0);
    assert_eq!(seq.state(), StateId::Idle);
}

#[test]
fn close_stops_treatment_and_parks() {
    let (mut seq, rig, _notifier) = opened(vec![100]);
    seq.handle_command(ControlCommand::Start).unwrap();

    seq.handle_command(ControlCommand::Close).unwrap();
    assert_eq!(seq.state(), StateId::Idle);
    assert!(!seq.context().controller.is_connected());
    assert!(rig.source.snapshot().contains(&SourceCall::Close));
}

// ── One-shot treatment ────────────────────────────────────────

#[test]
fn treat_runs_for_the_configured_duration() {
    let (mut seq, rig, _notifier) = opened(vec![100]);
    let t0 = rig.clock.now();
    rig.source.clear();

    seq.handle_command(ControlCommand::Treat).unwrap();
    assert_eq!(rig.clock.now() - t0, secs(5));
    assert_eq!(
        rig.source.snapshot(),
        vec![SourceCall::SetOutput(true), SourceCall::SetOutput(false)]
    );
    assert_eq!(seq.state(), StateId::Idle);
}

// ── Shutdown ──────────────────────────────────────────────────

#[test]
fn kill_exits_and_shutdown_closes() {
    let (mut seq, rig, notifier) = opened(vec![100]);
    assert_eq!(seq.handle_command(ControlCommand::Kill).unwrap(), Flow::Exit);

    seq.shutdown();
    assert_eq!(notifier.milestones().last(), Some(&ControlEvent::Closed));
    assert!(rig.source.snapshot().contains(&SourceCall::Close));

    let ctx = seq.into_context();
    assert!(!ctx.controller.is_connected());
}

#[test]
fn setter_errors_propagate() {
    let (mut seq, _rig, _notifier) = opened(vec![100]);
    assert!(matches!(
        seq.handle_command(ControlCommand::SetSimulate(true)),
        Err(Error::InvalidConfiguration(_))
    ));
}
