//! Minimal sysfs GPIO access
//!
//! Shared by the drive outputs and the ultrasonic ranger. Pins are exported
//! on first use and left exported on exit; re-exporting an already exported
//! pin is not an error.

use crate::error::Result;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

const GPIO_ROOT: &str = "/sys/class/gpio";

/// One exported sysfs GPIO line
#[derive(Debug)]
pub struct SysfsPin {
    number: u32,
    value_path: PathBuf,
}

impl SysfsPin {
    /// Export `number` as an output line (initially low)
    pub fn output(number: u32) -> Result<Self> {
        Self::export(number, "out")
    }

    /// Export `number` as an input line
    pub fn input(number: u32) -> Result<Self> {
        Self::export(number, "in")
    }

    fn export(number: u32, direction: &str) -> Result<Self> {
        let pin_dir = PathBuf::from(format!("{GPIO_ROOT}/gpio{number}"));
        if !pin_dir.exists() {
            if let Err(e) = fs::write(format!("{GPIO_ROOT}/export"), number.to_string()) {
                // EBUSY means another process already exported it
                if !pin_dir.exists() {
                    return Err(e.into());
                }
            }
            // udev needs a moment to apply permissions on the new node
            for _ in 0..10 {
                if pin_dir.join("direction").exists() {
                    break;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
        }
        fs::write(pin_dir.join("direction"), direction)?;
        Ok(Self {
            number,
            value_path: pin_dir.join("value"),
        })
    }

    /// Drive the line high or low
    pub fn set(&self, high: bool) -> Result<()> {
        fs::write(&self.value_path, if high { "1" } else { "0" })?;
        Ok(())
    }

    /// Read the line level
    pub fn read(&self) -> Result<bool> {
        let value = fs::read_to_string(&self.value_path)?;
        Ok(value.trim() == "1")
    }

    pub fn number(&self) -> u32 {
        self.number
    }
}
