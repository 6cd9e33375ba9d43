//! Sysfs GPIO drive outputs

use super::{DriveOutputs, DriveSignals};
use crate::config::DriveConfig;
use crate::error::{Error, Result};
use crate::gpio::SysfsPin;

/// H-bridge drive over four sysfs GPIO lines
pub struct SysfsDriveOutputs {
    left_forward: SysfsPin,
    left_reverse: SysfsPin,
    right_forward: SysfsPin,
    right_reverse: SysfsPin,
}

impl SysfsDriveOutputs {
    /// Export the four configured pins as outputs, all low
    pub fn open(config: &DriveConfig) -> Result<Self> {
        let outputs = Self {
            left_forward: SysfsPin::output(config.left_forward_pin)?,
            left_reverse: SysfsPin::output(config.left_reverse_pin)?,
            right_forward: SysfsPin::output(config.right_forward_pin)?,
            right_reverse: SysfsPin::output(config.right_reverse_pin)?,
        };
        log::info!(
            "SysfsDriveOutputs: pins LF={} LR={} RF={} RR={} exported (all low)",
            config.left_forward_pin,
            config.left_reverse_pin,
            config.right_forward_pin,
            config.right_reverse_pin
        );
        Ok(outputs)
    }

    fn set_line(pin: &SysfsPin, high: bool) -> Result<()> {
        pin.set(high)
            .map_err(|e| Error::ActuatorFault(format!("gpio{}: {}", pin.number(), e)))
    }
}

impl DriveOutputs for SysfsDriveOutputs {
    fn apply(&mut self, signals: DriveSignals) -> Result<()> {
        let lines = [
            (&self.left_forward, signals.left_forward),
            (&self.left_reverse, signals.left_reverse),
            (&self.right_forward, signals.right_forward),
            (&self.right_reverse, signals.right_reverse),
        ];
        // falling edges first: between the passes only lines common to the
        // old and new pattern are high, so directions never overlap
        for (pin, high) in &lines {
            if !high {
                Self::set_line(pin, false)?;
            }
        }
        for (pin, high) in &lines {
            if *high {
                Self::set_line(pin, true)?;
            }
        }
        Ok(())
    }
}
