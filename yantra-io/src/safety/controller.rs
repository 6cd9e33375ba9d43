//! Thread-safe entry points for the safety core
//!
//! Command intake, the proximity producer, the watchdog thread, and the
//! session server all act on the machine through this facade. One
//! `parking_lot::Mutex` covers the core and the obstacle monitor, so the
//! override check is atomic with the decision to honor a command, and
//! events reach the publish queue in transition order.

use std::sync::Arc;
use std::time::Instant;

use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;

use setu_link::{DriveCommand, Event};

use super::machine::{ActiveCommand, ActuatorState, IssueDecision, SafetyCore, SafetyStats};
use super::watchdog::Watchdog;
use crate::drive::DriveOutputs;
use crate::error::Result;

/// Shared handle to the actuator safety state machine
pub struct SafetyController {
    core: Arc<Mutex<SafetyCore>>,
    watchdog: Watchdog,
    events: Arc<ArrayQueue<Event>>,
}

impl SafetyController {
    /// Wrap the drive outputs in a safety core and start its watchdog.
    /// Events produced by transitions land in `events` for the publisher.
    pub fn new(
        outputs: Box<dyn DriveOutputs>,
        threshold_cm: f64,
        events: Arc<ArrayQueue<Event>>,
    ) -> Result<Self> {
        let core = Arc::new(Mutex::new(SafetyCore::new(outputs, threshold_cm)));

        let watchdog = {
            let core = Arc::clone(&core);
            let events = Arc::clone(&events);
            Watchdog::spawn(move |generation| {
                let mut pending = Vec::new();
                let mut core = core.lock();
                if let Err(e) = core.watchdog_fired(generation, &mut pending) {
                    log::error!("Safety: watchdog stop failed: {}", e);
                }
                push_events(&events, pending);
            })?
        };

        Ok(Self {
            core,
            watchdog,
            events,
        })
    }

    /// Apply one command and (dis)arm the watchdog accordingly. The arm
    /// happens under the core lock, so a superseded command can never
    /// re-arm over its replacement.
    pub fn issue(&self, cmd: &DriveCommand) -> IssueDecision {
        let mut pending = Vec::new();
        let mut core = self.core.lock();
        let decision = core.issue(cmd, Instant::now(), &mut pending);
        match &decision {
            IssueDecision::Drive {
                generation,
                deadline: Some(deadline),
            } => self.watchdog.arm(*generation, *deadline),
            _ => self.watchdog.cancel(),
        }
        push_events(&self.events, pending);
        decision
    }

    /// Feed a valid proximity sample through the override logic
    pub fn proximity_sample(&self, distance_cm: f64) -> Result<()> {
        let mut pending = Vec::new();
        let mut core = self.core.lock();
        let result = core.proximity_sample(distance_cm, Instant::now(), &mut pending);
        if pending
            .iter()
            .any(|e| matches!(e, Event::ObstacleStop { .. }))
        {
            self.watchdog.cancel();
        }
        push_events(&self.events, pending);
        result
    }

    /// Record a failed proximity read (override state persists)
    pub fn proximity_timeout(&self) {
        self.core.lock().proximity_timeout();
    }

    /// Unconditional stop for session teardown and shutdown
    pub fn force_stop(&self) -> Result<()> {
        let mut core = self.core.lock();
        self.watchdog.cancel();
        core.force_stop()
    }

    pub fn state(&self) -> ActuatorState {
        self.core.lock().state()
    }

    pub fn active(&self) -> Option<ActiveCommand> {
        self.core.lock().active()
    }

    pub fn override_distance_cm(&self) -> Option<f64> {
        self.core.lock().override_distance_cm()
    }

    pub fn is_halted(&self) -> bool {
        self.core.lock().is_halted()
    }

    pub fn stats(&self) -> SafetyStats {
        self.core.lock().stats()
    }
}

/// Move transition events into the bounded publish queue, oldest dropped
/// on overflow. Callers hold the core lock, so queue order is transition
/// order.
fn push_events(queue: &ArrayQueue<Event>, pending: Vec<Event>) {
    for event in pending {
        if queue.force_push(event).is_some() {
            log::warn!("Safety: event queue full, dropped oldest event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::MockDriveOutputs;
    use setu_link::Direction;
    use std::thread;
    use std::time::Duration;

    fn controller_with_mock() -> (SafetyController, MockDriveOutputs, Arc<ArrayQueue<Event>>) {
        let mock = MockDriveOutputs::new();
        let events = Arc::new(ArrayQueue::new(16));
        let controller =
            SafetyController::new(Box::new(mock.clone()), 30.0, Arc::clone(&events)).unwrap();
        (controller, mock, events)
    }

    #[test]
    fn test_timed_drive_expires_on_its_own() {
        let (controller, mock, events) = controller_with_mock();

        let decision = controller.issue(&DriveCommand::timed(Direction::Forward, 0.05));
        assert!(matches!(decision, IssueDecision::Drive { .. }));

        thread::sleep(Duration::from_millis(300));
        assert_eq!(controller.state(), ActuatorState::Idle);
        assert!(!mock.current().any_asserted());
        assert_eq!(
            events.pop(),
            Some(Event::CommandCompleted {
                direction: Direction::Forward,
                duration_s: 0.05
            })
        );
    }

    #[test]
    fn test_indefinite_drive_outlives_the_wait() {
        let (controller, mock, _events) = controller_with_mock();

        controller.issue(&DriveCommand::timed(Direction::Backward, 0.0));
        thread::sleep(Duration::from_millis(150));
        assert_eq!(controller.state(), ActuatorState::Driving);
        assert_eq!(
            mock.current(),
            crate::drive::DriveSignals::for_direction(Direction::Backward)
        );

        controller.issue(&DriveCommand::stop());
        assert_eq!(controller.state(), ActuatorState::Idle);
    }

    #[test]
    fn test_superseded_command_cannot_expire_replacement() {
        let (controller, mock, events) = controller_with_mock();

        controller.issue(&DriveCommand::timed(Direction::Forward, 0.03));
        controller.issue(&DriveCommand::timed(Direction::Left, 0.0));

        // first deadline passes; the indefinite left drive must survive it
        thread::sleep(Duration::from_millis(200));
        assert_eq!(controller.state(), ActuatorState::Driving);
        assert_eq!(
            mock.current(),
            crate::drive::DriveSignals::for_direction(Direction::Left)
        );
        assert!(events.pop().is_none());
    }
}
