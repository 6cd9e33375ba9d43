//! Motion safety
//!
//! The safety layer owns the drive outputs outright. Everything that can
//! start or stop motion (commands, the drive watchdog, obstacle samples,
//! session teardown) is funneled through [`SafetyController`] into the
//! state machine, which applies transitions one at a time.

mod controller;
mod machine;
mod monitor;
mod watchdog;

pub use controller::SafetyController;
pub use machine::{ActiveCommand, ActuatorState, IssueDecision, SafetyCore, SafetyStats};
pub use monitor::{ObstacleMonitor, OverrideRecord};
pub use watchdog::Watchdog;
