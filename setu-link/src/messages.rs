//! Message types exchanged between the controller and actuator nodes.
//!
//! Three message classes ride the link after the handshake:
//! - Telemetry (actuator → controller): scan frames and proximity readings
//! - Command (controller → actuator): drive commands, including explicit stop
//! - Event (actuator → controller): completion, rejection, and connectivity
//!   notifications

use crate::wire::WireFormat;
use serde::{Deserialize, Serialize};

/// Protocol version carried in the handshake. Bump on any incompatible
/// change to the frame layout.
pub const PROTOCOL_VERSION: u8 = 1;

/// Drive direction for differential GPIO drive hardware
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
}

impl Direction {
    /// Direction name for log lines
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
            Self::Left => "left",
            Self::Right => "right",
            Self::Stop => "stop",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Motion command sent from the controller to the actuator node
///
/// At most one command is active at a time; a new command supersedes the
/// previous one. `direction = stop` is the explicit stop.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DriveCommand {
    /// Requested direction
    pub direction: Direction,
    /// Drive duration in seconds; 0 means drive until superseded or stopped
    pub duration_s: f64,
    /// Advisory speed 0-100%; binary drive hardware may ignore it
    pub speed_pct: u8,
}

impl DriveCommand {
    /// Timed drive in the given direction
    pub fn timed(direction: Direction, duration_s: f64) -> Self {
        Self {
            direction,
            duration_s,
            speed_pct: 100,
        }
    }

    /// Explicit stop
    pub fn stop() -> Self {
        Self {
            direction: Direction::Stop,
            duration_s: 0.0,
            speed_pct: 0,
        }
    }
}

/// One sensor revolution of range-bearing samples
///
/// `ranges` and `angles_deg` are parallel arrays; receivers must treat a
/// length mismatch as a malformed frame. Angles follow the sensor
/// convention (degrees, 0-360), ranges are meters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScanFrame {
    /// Timestamp in microseconds since epoch
    pub timestamp_us: u64,
    /// Monotonically increasing scan number
    pub scan_number: u64,
    /// Measured ranges in meters
    pub ranges: Vec<f64>,
    /// Bearing of each range sample in degrees
    pub angles_deg: Vec<f64>,
}

/// Single proximity measurement from the forward-facing ranger
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ProximityReading {
    /// Timestamp in microseconds since epoch
    pub timestamp_us: u64,
    /// Measured distance in centimeters
    pub distance_cm: f64,
}

/// Telemetry published by the actuator node
///
/// Best-effort, latest-value semantics: a receiver that falls behind sees
/// newer frames, not a backlog.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Telemetry {
    Scan(ScanFrame),
    Proximity(ProximityReading),
}

/// State-change notifications published by the actuator node
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Event {
    /// A timed command ran to its deadline
    CommandCompleted { direction: Direction, duration_s: f64 },
    /// The obstacle override preempted an active command
    ObstacleStop { distance_cm: f64 },
    /// A command was not accepted (obstacle override, malformed input)
    CommandRejected { reason: String },
    /// Session established or torn down
    Connectivity { connected: bool },
}

/// Peer role declared in the handshake
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Controller,
    Actuator,
}

/// First frame on a new connection, client → server
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Hello {
    pub role: Role,
    /// Human-readable peer name for logs
    pub node_name: String,
    /// Must equal [`PROTOCOL_VERSION`]
    pub version: u8,
}

/// Handshake reply, server → client
///
/// All frames after this one use `wire_format`; the handshake itself is
/// always JSON so the client can read the reply before the format is known.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Welcome {
    /// Server-assigned session identifier, unique per accept
    pub session_id: u64,
    /// Wire format for all post-handshake frames
    pub wire_format: WireFormat,
}

/// Top-level frame enum; every payload on the wire is one of these
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Frame {
    Hello(Hello),
    Welcome(Welcome),
    Command(DriveCommand),
    Telemetry(Telemetry),
    Event(Event),
}

impl Frame {
    /// Frame class for log lines; payloads can be large
    pub fn name(&self) -> &'static str {
        match self {
            Frame::Hello(_) => "hello",
            Frame::Welcome(_) => "welcome",
            Frame::Command(_) => "command",
            Frame::Telemetry(_) => "telemetry",
            Frame::Event(_) => "event",
        }
    }
}

/// Microseconds since the Unix epoch, for telemetry timestamps
pub fn now_micros() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_names() {
        assert_eq!(Direction::Forward.as_str(), "forward");
        assert_eq!(Direction::Stop.as_str(), "stop");
        assert_eq!(format!("{}", Direction::Left), "left");
    }

    #[test]
    fn test_stop_command_shape() {
        let cmd = DriveCommand::stop();
        assert_eq!(cmd.direction, Direction::Stop);
        assert_eq!(cmd.duration_s, 0.0);
    }

    #[test]
    fn test_direction_json_is_lowercase() {
        let json = serde_json::to_string(&Direction::Backward).unwrap();
        assert_eq!(json, "\"backward\"");
    }
}
