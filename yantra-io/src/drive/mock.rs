//! Mock drive outputs for testing

use super::{DriveOutputs, DriveSignals};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// Mock drive outputs
///
/// Records every applied pattern so tests can assert on the full assertion
/// sequence, not just the final state.
#[derive(Clone)]
pub struct MockDriveOutputs {
    state: Arc<Mutex<MockDriveState>>,
}

#[derive(Debug, Default)]
struct MockDriveState {
    current: DriveSignals,
    history: Vec<DriveSignals>,
    fail_count: u32,
}

impl MockDriveOutputs {
    /// Create new mock drive outputs
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockDriveState::default())),
        }
    }

    /// Currently applied pattern
    pub fn current(&self) -> DriveSignals {
        self.state.lock().current
    }

    /// Every pattern applied so far, in order
    pub fn history(&self) -> Vec<DriveSignals> {
        self.state.lock().history.clone()
    }

    /// Clear the recorded history
    pub fn clear_history(&self) {
        self.state.lock().history.clear();
    }

    /// Make the next apply fail
    pub fn fail_next_apply(&self) {
        self.state.lock().fail_count = 1;
    }

    /// Make the next `n` applies fail
    pub fn fail_applies(&self, n: u32) {
        self.state.lock().fail_count = n;
    }
}

impl Default for MockDriveOutputs {
    fn default() -> Self {
        Self::new()
    }
}

impl DriveOutputs for MockDriveOutputs {
    fn apply(&mut self, signals: DriveSignals) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_count > 0 {
            state.fail_count -= 1;
            return Err(Error::ActuatorFault("injected output fault".to_string()));
        }
        state.current = signals;
        state.history.push(signals);
        Ok(())
    }
}
