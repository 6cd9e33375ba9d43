//! SetuLink - session protocol between the controller and actuator nodes
//!
//! One TCP connection carries commands (controller → actuator) and
//! telemetry/events (actuator → controller) as length-prefixed frames.
//! This crate holds the pieces both nodes share: frame types, wire
//! serialization, framing helpers, and the session lifecycle object.

pub mod error;
pub mod messages;
pub mod session;
pub mod wire;

// Re-export commonly used types
pub use error::{LinkError, Result};
pub use messages::{
    now_micros, Direction, DriveCommand, Event, Frame, Hello, ProximityReading, Role, ScanFrame,
    Telemetry, Welcome, PROTOCOL_VERSION,
};
pub use session::{Session, SessionState};
pub use wire::{read_frame, write_frame, Serializer, WireFormat, MAX_FRAME_SIZE};
