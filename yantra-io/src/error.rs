//! Error types for YantraIO

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// YantraIO error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration parse error
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Configuration write error
    #[error("Config serialize error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    /// Session link error
    #[error("Link error: {0}")]
    Link(#[from] setu_link::LinkError),

    /// Sensor poll exceeded its deadline
    #[error("Communication timeout")]
    Timeout,

    /// Command refused because the obstacle override is active
    #[error("Command blocked: obstacle at {distance_cm:.1} cm")]
    BlockedByObstacle {
        /// Distance recorded when the override was set
        distance_cm: f64,
    },

    /// Actuator output write failed; outputs may be in an unknown state
    #[error("Actuator fault: {0}")]
    ActuatorFault(String),

    /// Invalid packet or response from a sensor
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
