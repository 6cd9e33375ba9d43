//! Drive output control
//!
//! Four GPIO lines feed an H-bridge, one forward and one reverse line per
//! side. The only mutation point is [`DriveOutputs::apply`], which takes
//! the level of all four lines in one call; implementations clear falling
//! lines before raising new ones, so two directions are never asserted
//! together, not even transiently.

mod mock;
mod sysfs;
pub use mock::MockDriveOutputs;
pub use sysfs::SysfsDriveOutputs;

use crate::config::DriveConfig;
use crate::error::{Error, Result};
use setu_link::Direction;

/// Desired level for each of the four H-bridge input lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriveSignals {
    pub left_forward: bool,
    pub left_reverse: bool,
    pub right_forward: bool,
    pub right_reverse: bool,
}

impl DriveSignals {
    /// All lines low
    pub fn stop() -> Self {
        Self::default()
    }

    /// Line pattern for a direction; turns are in-place spins
    pub fn for_direction(direction: Direction) -> Self {
        match direction {
            Direction::Forward => Self {
                left_forward: true,
                right_forward: true,
                ..Self::default()
            },
            Direction::Backward => Self {
                left_reverse: true,
                right_reverse: true,
                ..Self::default()
            },
            Direction::Left => Self {
                left_reverse: true,
                right_forward: true,
                ..Self::default()
            },
            Direction::Right => Self {
                left_forward: true,
                right_reverse: true,
                ..Self::default()
            },
            Direction::Stop => Self::stop(),
        }
    }

    /// True if any line is asserted
    pub fn any_asserted(&self) -> bool {
        self.left_forward || self.left_reverse || self.right_forward || self.right_reverse
    }

    /// True if this pattern shares an asserted line with `other`
    pub fn overlaps(&self, other: &Self) -> bool {
        (self.left_forward && other.left_forward)
            || (self.left_reverse && other.left_reverse)
            || (self.right_forward && other.right_forward)
            || (self.right_reverse && other.right_reverse)
    }
}

/// Actuator output sink
pub trait DriveOutputs: Send {
    /// Drive all four lines to the requested levels in one operation
    fn apply(&mut self, signals: DriveSignals) -> Result<()>;

    /// Force every line low
    fn deassert_all(&mut self) -> Result<()> {
        self.apply(DriveSignals::stop())
    }
}

/// Build the configured output backend
pub fn open_outputs(config: &DriveConfig) -> Result<Box<dyn DriveOutputs>> {
    match config.device.as_str() {
        "sysfs" => Ok(Box::new(SysfsDriveOutputs::open(config)?)),
        "mock" => Ok(Box::new(MockDriveOutputs::new())),
        other => Err(Error::InvalidParameter(format!(
            "unknown drive device '{}'",
            other
        ))),
    }
}

/// Scoped ownership of the drive outputs
///
/// Acquiring the guard forces all lines low; releasing it (normal drop or
/// unwind) does the same, so asserted outputs cannot outlive their owner.
pub struct DriveGuard {
    outputs: Box<dyn DriveOutputs>,
}

impl DriveGuard {
    pub fn acquire(mut outputs: Box<dyn DriveOutputs>) -> Result<Self> {
        outputs.deassert_all()?;
        Ok(Self { outputs })
    }
}

impl DriveOutputs for DriveGuard {
    fn apply(&mut self, signals: DriveSignals) -> Result<()> {
        self.outputs.apply(signals)
    }

    fn deassert_all(&mut self) -> Result<()> {
        self.outputs.deassert_all()
    }
}

impl Drop for DriveGuard {
    fn drop(&mut self) {
        if let Err(e) = self.outputs.deassert_all() {
            log::error!("DriveGuard: failed to deassert outputs on release: {}", e);
        }
    }
}
