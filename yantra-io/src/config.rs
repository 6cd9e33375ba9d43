//! Configuration for the YantraIO daemon
//!
//! Loads configuration from a TOML file. Every section has defaults, so a
//! missing or partial file still yields a runnable simulation setup.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub drive: DriveConfig,
    pub safety: SafetyConfig,
    pub scanner: ScannerConfig,
    pub ranger: RangerConfig,
    pub logging: LoggingConfig,
}

/// Session server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP bind address for the controller session
    ///
    /// Examples:
    /// - `0.0.0.0:5560` - Bind to all interfaces on port 5560
    /// - `127.0.0.1:5560` - Localhost only
    pub bind_address: String,
    /// Wire format for post-handshake frames ("json" or "postcard")
    pub wire_format: String,
    /// How long a new connection may take to send its Hello (ms)
    pub handshake_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5560".to_string(),
            wire_format: "json".to_string(),
            handshake_timeout_ms: 3000,
        }
    }
}

/// Drive output configuration
///
/// Pin numbers are BCM GPIO numbers for the sysfs backend. The four lines
/// drive an H-bridge: one forward and one reverse line per side.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Output backend: "sysfs" for GPIO hardware, "mock" for development
    pub device: String,
    pub left_forward_pin: u32,
    pub left_reverse_pin: u32,
    pub right_forward_pin: u32,
    pub right_reverse_pin: u32,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            device: "mock".to_string(),
            left_forward_pin: 17,
            left_reverse_pin: 27,
            right_forward_pin: 22,
            right_reverse_pin: 23,
        }
    }
}

/// Motion safety configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Proximity below this distance asserts the obstacle override (cm)
    pub obstacle_threshold_cm: f64,
    /// Proximity sampling interval (ms)
    pub proximity_poll_ms: u64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            obstacle_threshold_cm: 30.0,
            proximity_poll_ms: 100,
        }
    }
}

/// Range scanner (lidar) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Scanner backend: "rplidar" for serial hardware, "sim" for development
    pub device: String,
    /// Serial port path for the rplidar backend
    pub port: String,
    /// Serial baud rate
    pub baud_rate: u32,
    /// Give up on a revolution after this long (ms)
    pub scan_timeout_ms: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            device: "sim".to_string(),
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            scan_timeout_ms: 2000,
        }
    }
}

/// Proximity ranger configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RangerConfig {
    /// Ranger backend: "hcsr04" for GPIO hardware, "sim" for development
    pub device: String,
    /// Trigger line (BCM GPIO number)
    pub trigger_pin: u32,
    /// Echo line (BCM GPIO number)
    pub echo_pin: u32,
    /// Echo wait deadline per measurement (ms)
    pub echo_timeout_ms: u64,
    /// Median filter width per reported reading
    pub samples: usize,
    /// Fixed distance reported by the sim backend (cm)
    pub sim_distance_cm: f64,
}

impl Default for RangerConfig {
    fn default() -> Self {
        Self {
            device: "sim".to_string(),
            trigger_pin: 5,
            echo_pin: 6,
            echo_timeout_ms: 50,
            samples: 3,
            sim_distance_cm: 150.0,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log filter when RUST_LOG is unset (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}
