//! Safety machine integration tests
//!
//! These run the real watchdog and producer threads against mock outputs
//! and simulated sensors, so they exercise the same paths a live daemon
//! uses: timed expiry, obstacle preemption through the proximity
//! producer, and the output line sequences the machine writes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_queue::ArrayQueue;
use setu_link::{Direction, DriveCommand, Event};
use yantra_io::drive::{DriveSignals, MockDriveOutputs};
use yantra_io::safety::{ActuatorState, IssueDecision, SafetyController};
use yantra_io::sensors::{SimRanger, SimScanner};
use yantra_io::server::TelemetryQueues;
use yantra_io::telemetry::{spawn_proximity_producer, spawn_scan_producer};

fn drain_events(queue: &ArrayQueue<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Some(event) = queue.pop() {
        events.push(event);
    }
    events
}

/// Controller wired to a probe-able mock, plus the event queue it feeds.
fn test_controller(threshold_cm: f64) -> (Arc<SafetyController>, MockDriveOutputs, TelemetryQueues)
{
    let mock = MockDriveOutputs::new();
    let probe = mock.clone();
    let queues = TelemetryQueues::new();
    let safety = SafetyController::new(
        Box::new(mock),
        threshold_cm,
        Arc::clone(&queues.events),
    )
    .expect("controller start");
    (Arc::new(safety), probe, queues)
}

#[test]
fn test_timed_drive_completes_unattended() {
    let (safety, probe, queues) = test_controller(30.0);

    let decision = safety.issue(&DriveCommand::timed(Direction::Forward, 0.05));
    match decision {
        IssueDecision::Drive { deadline, .. } => {
            assert!(deadline.is_some(), "timed command must carry a deadline")
        }
        other => panic!("expected Drive decision, got {:?}", other),
    }
    assert_eq!(safety.state(), ActuatorState::Driving);

    // Nobody touches the controller; the watchdog alone must end the drive
    thread::sleep(Duration::from_millis(400));

    assert_eq!(safety.state(), ActuatorState::Idle);
    let history = probe.history();
    assert_eq!(history.len(), 2, "one assert and one deassert");
    assert_eq!(history[0], DriveSignals::for_direction(Direction::Forward));
    assert_eq!(history[1], DriveSignals::stop());

    let events = drain_events(&queues.events);
    assert!(
        events.iter().any(|e| matches!(
            e,
            Event::CommandCompleted {
                direction: Direction::Forward,
                ..
            }
        )),
        "watchdog completion must be reported, got {:?}",
        events
    );
}

#[test]
fn test_indefinite_drive_outlives_any_watchdog() {
    let (safety, _probe, queues) = test_controller(30.0);

    let cmd = DriveCommand {
        direction: Direction::Backward,
        duration_s: 0.0,
        speed_pct: 80,
    };
    assert!(matches!(safety.issue(&cmd), IssueDecision::Drive { .. }));

    thread::sleep(Duration::from_millis(150));
    assert_eq!(
        safety.state(),
        ActuatorState::Driving,
        "duration 0 means no deadline"
    );

    assert!(matches!(
        safety.issue(&DriveCommand::stop()),
        IssueDecision::Stop
    ));
    assert_eq!(safety.state(), ActuatorState::Idle);

    // Explicit stops do not count as completions
    let events = drain_events(&queues.events);
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, Event::CommandCompleted { .. })),
        "no completion for an explicit stop, got {:?}",
        events
    );
}

#[test]
fn test_proximity_producer_forces_obstacle_stop() {
    let (safety, probe, queues) = test_controller(30.0);
    let running = Arc::new(AtomicBool::new(true));

    // Three clear readings, then a wall at 12 cm for the rest of the test
    let mut script = vec![100.0, 100.0, 100.0];
    script.extend(std::iter::repeat(12.0).take(17));
    let ranger = Box::new(SimRanger::scripted(script));

    let producer = spawn_proximity_producer(
        ranger,
        Arc::clone(&safety),
        Arc::clone(&queues.proximity),
        Duration::from_millis(25),
        Arc::clone(&running),
    )
    .expect("producer start");

    // Command lands while the path is still clear
    let cmd = DriveCommand {
        direction: Direction::Forward,
        duration_s: 0.0,
        speed_pct: 100,
    };
    assert!(matches!(safety.issue(&cmd), IssueDecision::Drive { .. }));

    // 250 ms covers the three clear polls plus several obstacle polls
    thread::sleep(Duration::from_millis(250));

    assert_eq!(
        safety.state(),
        ActuatorState::Idle,
        "obstacle sample must preempt the drive"
    );
    assert!(
        matches!(
            safety.issue(&DriveCommand::timed(Direction::Forward, 1.0)),
            IssueDecision::Rejected { .. }
        ),
        "override still active, drive must be refused"
    );

    running.store(false, Ordering::Relaxed);
    producer.join().expect("producer join");

    let history = probe.history();
    assert_eq!(history[0], DriveSignals::for_direction(Direction::Forward));
    assert_eq!(history[1], DriveSignals::stop());

    let events = drain_events(&queues.events);
    assert!(
        events
            .iter()
            .any(|e| matches!(e, Event::ObstacleStop { distance_cm } if *distance_cm < 30.0)),
        "obstacle stop must be reported, got {:?}",
        events
    );
    assert!(
        queues.proximity.pop().is_some(),
        "producer must also publish readings as telemetry"
    );
}

#[test]
fn test_override_blocks_every_direction_until_cleared() {
    let (safety, _probe, _queues) = test_controller(30.0);

    safety.proximity_sample(10.0).expect("sample");

    for direction in [
        Direction::Forward,
        Direction::Backward,
        Direction::Left,
        Direction::Right,
    ] {
        assert!(
            matches!(
                safety.issue(&DriveCommand::timed(direction, 1.0)),
                IssueDecision::Rejected { .. }
            ),
            "{direction} must be refused while the override is active"
        );
    }
    // Stop is always allowed
    assert!(matches!(
        safety.issue(&DriveCommand::stop()),
        IssueDecision::Stop
    ));

    safety.proximity_sample(80.0).expect("sample");
    assert!(matches!(
        safety.issue(&DriveCommand::timed(Direction::Forward, 0.02)),
        IssueDecision::Drive { .. }
    ));
}

#[test]
fn test_scan_producer_streams_revolutions() {
    let queues = TelemetryQueues::new();
    let running = Arc::new(AtomicBool::new(true));

    let producer = spawn_scan_producer(
        Box::new(SimScanner::new()),
        Arc::clone(&queues.scans),
        Arc::clone(&running),
    )
    .expect("producer start");

    // Sim revolutions take 100 ms each
    thread::sleep(Duration::from_millis(350));
    running.store(false, Ordering::Relaxed);
    producer.join().expect("producer join");

    let first = queues.scans.pop().expect("at least one revolution");
    assert!(!first.ranges.is_empty());
    if let Some(second) = queues.scans.pop() {
        assert!(
            second.scan_number > first.scan_number,
            "revolutions must be numbered in order"
        );
    }
}
