//! Sensor devices
//!
//! Two device roles feed the daemon: a revolution-per-frame range scanner
//! and a single-beam proximity ranger. Each has a hardware backend and a
//! simulated one, selected by the `device` field of its config section.

mod rplidar;
mod sim;
mod ultrasonic;

pub use rplidar::RplidarScanner;
pub use sim::{SimRanger, SimScanner};
pub use ultrasonic::UltrasonicRanger;

use std::time::Duration;

use setu_link::ScanFrame;

use crate::config::{RangerConfig, ScannerConfig};
use crate::error::{Error, Result};
use crate::transport::SerialTransport;

/// Revolution-oriented range scanner
pub trait Scanner: Send {
    /// Put the device in scan mode
    fn start(&mut self) -> Result<()>;

    /// Block until one revolution is assembled. `Ok(None)` when the device
    /// is not scanning.
    fn read_scan(&mut self) -> Result<Option<ScanFrame>>;

    /// Leave scan mode
    fn stop(&mut self) -> Result<()>;
}

/// Single-beam proximity ranger
pub trait ProximityRanger: Send {
    /// One filtered distance reading in centimeters. A sensor that does
    /// not answer returns [`Error::Timeout`], never a fake distance.
    fn measure(&mut self) -> Result<f64>;
}

/// Build the configured scanner backend
pub fn open_scanner(config: &ScannerConfig) -> Result<Box<dyn Scanner>> {
    match config.device.as_str() {
        "rplidar" => {
            let transport = SerialTransport::open(&config.port, config.baud_rate)?;
            log::info!("Sensors: rplidar on {} at {} baud", config.port, config.baud_rate);
            Ok(Box::new(RplidarScanner::new(
                Box::new(transport),
                Duration::from_millis(config.scan_timeout_ms),
            )))
        }
        "sim" => Ok(Box::new(SimScanner::new())),
        other => Err(Error::InvalidParameter(format!(
            "unknown scanner device '{}'",
            other
        ))),
    }
}

/// Build the configured proximity ranger backend
pub fn open_ranger(config: &RangerConfig) -> Result<Box<dyn ProximityRanger>> {
    match config.device.as_str() {
        "hcsr04" => Ok(Box::new(UltrasonicRanger::open(config)?)),
        "sim" => Ok(Box::new(SimRanger::constant(config.sim_distance_cm))),
        other => Err(Error::InvalidParameter(format!(
            "unknown ranger device '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_devices_rejected() {
        let mut scanner_config = ScannerConfig::default();
        scanner_config.device = "lidar9000".to_string();
        assert!(open_scanner(&scanner_config).is_err());

        let mut ranger_config = RangerConfig::default();
        ranger_config.device = "sonar9000".to_string();
        assert!(open_ranger(&ranger_config).is_err());
    }

    #[test]
    fn test_sim_devices_open() {
        assert!(open_scanner(&ScannerConfig::default()).is_ok());
        assert!(open_ranger(&RangerConfig::default()).is_ok());
    }
}
