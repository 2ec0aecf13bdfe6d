//! ControlQueue tests with a live worker thread.

use std::thread;
use std::time::Duration;

use oncolysis::app::controller::{Controller, Instruments};
use oncolysis::app::events::ControlEvent;
use oncolysis::app::ports::Notifier;
use oncolysis::app::queue::ControlQueue;
use oncolysis::error::Error;
use oncolysis::fsm::context::TREATMENT_COMPLETE;

use crate::mock_hw::{
    CallLog, MockSource, MockSwitch, RecordingNotifier, SourceCall, SteppingClock, test_config,
    test_profile,
};

struct Harness {
    queue: ControlQueue,
    notifier: RecordingNotifier,
    source: CallLog<SourceCall>,
}

fn harness_with(source: MockSource) -> Harness {
    let notifier = RecordingNotifier::new();
    let log = source.log();
    let instruments = Instruments {
        source: Box::new(source),
        switches: vec![Box::new(MockSwitch::new())],
    };
    let controller = Controller::new(
        test_config(),
        test_profile(),
        instruments,
        Box::new(SteppingClock::new()),
    )
    .unwrap();
    Harness {
        queue: ControlQueue::new(controller, Box::new(notifier.clone())),
        notifier,
        source: log,
    }
}

fn harness() -> Harness {
    harness_with(MockSource::new())
}

fn wait_until_stopped(queue: &ControlQueue) -> bool {
    for _ in 0..2000 {
        if !queue.is_running() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

#[test]
fn commands_rejected_until_worker_starts() {
    let h = harness();
    assert_eq!(h.queue.open(), Err(Error::NotRunning));
    assert_eq!(h.queue.start(), Err(Error::NotRunning));
    assert!(!h.queue.is_running());
    assert!(h.queue.controller().is_some());
}

#[test]
fn invalid_setters_fail_before_enqueueing() {
    let mut h = harness();
    assert!(matches!(
        h.queue.set_duty_cycle(0.0),
        Err(Error::InvalidConfiguration(_))
    ));

    h.queue.start_worker().unwrap();
    assert!(matches!(
        h.queue.set_frequencies(vec![100, 100]),
        Err(Error::InvalidConfiguration(_))
    ));
    assert!(matches!(
        h.queue.set_duration(Duration::ZERO),
        Err(Error::InvalidConfiguration(_))
    ));
    h.queue.kill().unwrap();
}

#[test]
fn full_sweep_runs_on_the_worker() {
    let mut h = harness();
    h.queue.start_worker().unwrap();
    assert!(h.queue.is_running());
    assert!(h.queue.controller().is_none());

    h.queue.set_frequencies(vec![100, 150]).unwrap();
    h.queue.set_duration(Duration::from_secs(1)).unwrap();
    h.queue.open().unwrap();
    h.queue.start().unwrap();

    assert!(
        h.notifier
            .wait_for(|e| matches!(e, ControlEvent::Ended(_)))
    );
    let milestones = h.notifier.milestones();
    assert!(matches!(milestones[0], ControlEvent::Opened(_)));
    assert_eq!(
        milestones[1..],
        [
            ControlEvent::Treating {
                index: 0,
                frequency_khz: 100
            },
            ControlEvent::Treating {
                index: 1,
                frequency_khz: 150
            },
            ControlEvent::Ended(TREATMENT_COMPLETE.into()),
        ]
    );

    h.queue.kill().unwrap();
    assert_eq!(h.notifier.milestones().last(), Some(&ControlEvent::Closed));
    assert!(h.source.snapshot().contains(&SourceCall::Close));
}

#[test]
fn kill_hands_the_controller_back_and_restart_works() {
    let mut h = harness();
    h.queue.start_worker().unwrap();
    h.queue.open().unwrap();
    assert!(
        h.notifier
            .wait_for(|e| matches!(e, ControlEvent::Opened(_)))
    );

    h.queue.kill().unwrap();
    assert!(!h.queue.is_running());
    assert!(!h.queue.controller().unwrap().is_connected());
    assert!(!h.queue.status().ready);
    assert_eq!(h.queue.open(), Err(Error::NotRunning));

    h.queue.start_worker().unwrap();
    h.queue.open().unwrap();
    h.queue.kill().unwrap();

    // FIFO: the second OPEN ran before KILL.
    let opened = h
        .notifier
        .milestones()
        .iter()
        .filter(|e| matches!(e, ControlEvent::Opened(_)))
        .count();
    assert_eq!(opened, 2);
}

#[test]
fn status_snapshot_follows_the_worker() {
    let mut h = harness();
    h.queue.start_worker().unwrap();
    h.queue.set_frequencies(vec![150]).unwrap();
    h.queue.open().unwrap();
    h.queue.start().unwrap();
    assert!(h.notifier.wait_for(|e| matches!(e, ControlEvent::Treating { .. })));

    let mut seen = false;
    for _ in 0..2000 {
        let status = h.queue.status();
        if status.treating && status.frequency_khz == Some(150) {
            seen = true;
            break;
        }
        thread::sleep(Duration::from_millis(2));
    }
    assert!(seen);
    h.queue.kill().unwrap();
}

#[test]
fn adapter_panic_becomes_worker_fault_and_closes() {
    let mut source = MockSource::new();
    source.panic_on_frequency = true;
    let mut h = harness_with(source);

    h.queue.start_worker().unwrap();
    h.queue.set_frequencies(vec![100]).unwrap();
    h.queue.open().unwrap();
    h.queue.start().unwrap();

    assert!(h.notifier.wait_for(|e| matches!(e, ControlEvent::Closed)));
    assert!(wait_until_stopped(&h.queue));

    let events = h.notifier.milestones();
    let fault = events.iter().find_map(|e| match e {
        ControlEvent::Error(Error::WorkerFault(msg)) => Some(msg.clone()),
        _ => None,
    });
    assert_eq!(fault.as_deref(), Some("mock source exploded"));
    assert_eq!(h.queue.start(), Err(Error::NotRunning));

    // A dead worker can be reclaimed and restarted.
    h.queue.start_worker().unwrap();
    assert!(h.queue.is_running());
    h.queue.kill().unwrap();
    assert!(h.queue.controller().is_some());
}

#[test]
fn close_failure_after_a_fault_is_reported_too() {
    let mut source = MockSource::new();
    source.panic_on_frequency = true;
    source.close_error = Some(Error::Io("stuck".into()));
    let mut h = harness_with(source);

    h.queue.start_worker().unwrap();
    h.queue.set_frequencies(vec![100]).unwrap();
    h.queue.open().unwrap();
    h.queue.start().unwrap();

    assert!(
        h.notifier
            .wait_for(|e| matches!(e, ControlEvent::Error(Error::Io(_))))
    );
    assert!(wait_until_stopped(&h.queue));

    let errors: Vec<Error> = h
        .notifier
        .milestones()
        .into_iter()
        .filter_map(|e| match e {
            ControlEvent::Error(err) => Some(err),
            _ => None,
        })
        .collect();
    assert_eq!(
        errors,
        vec![
            Error::WorkerFault("mock source exploded".into()),
            Error::Io("stuck".into()),
        ]
    );
    assert!(!h.notifier.milestones().contains(&ControlEvent::Closed));
}

/// Records events and panics whenever it is handed an error.
struct PanickingOnError(RecordingNotifier);

impl Notifier for PanickingOnError {
    fn notify(&mut self, event: &ControlEvent) {
        self.0.notify(event);
        assert!(
            !matches!(event, ControlEvent::Error(_)),
            "error callback exploded"
        );
    }
}

#[test]
fn panicking_error_notifier_still_shuts_down() {
    let notifier = RecordingNotifier::new();
    let mut source = MockSource::new();
    source.panic_on_frequency = true;
    let log = source.log();
    let instruments = Instruments {
        source: Box::new(source),
        switches: vec![Box::new(MockSwitch::new())],
    };
    let controller = Controller::new(
        test_config(),
        test_profile(),
        instruments,
        Box::new(SteppingClock::new()),
    )
    .unwrap();
    let mut queue = ControlQueue::new(controller, Box::new(PanickingOnError(notifier.clone())));

    queue.start_worker().unwrap();
    queue.set_frequencies(vec![100]).unwrap();
    queue.open().unwrap();
    queue.start().unwrap();

    assert!(notifier.wait_for(|e| matches!(e, ControlEvent::Closed)));
    assert!(wait_until_stopped(&queue));
    assert!(log.snapshot().contains(&SourceCall::Close));

    // The context came back, so the worker can be restarted.
    queue.start_worker().unwrap();
    queue.kill().unwrap();
    assert!(queue.controller().is_some());
}
