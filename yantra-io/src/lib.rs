//! YantraIO - actuator and sensor daemon for the differential-drive robot
//!
//! This library holds the daemon's building blocks: drive output control
//! with a motion safety machine in front of it, range scanner and
//! proximity ranger backends, telemetry producer threads, and the TCP
//! session server that speaks [`setu_link`] to the controller node.
//!
//! Every drive mutation goes through [`safety::SafetyController`]; nothing
//! else in the process touches the output lines.

pub mod config;
pub mod drive;
pub mod error;
pub mod gpio;
pub mod safety;
pub mod sensors;
pub mod server;
pub mod telemetry;
pub mod transport;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{Error, Result};
