//! Simulated sensors for development without hardware
//!
//! `SimScanner` ray-casts a rectangular room from its center and adds
//! Gaussian range noise, one revolution per read at roughly the rate of
//! the real sensor. `SimRanger` replays a distance script, with negative
//! entries standing in for missing echoes.

use std::thread;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use setu_link::{now_micros, ScanFrame};

use super::{ProximityRanger, Scanner};
use crate::error::{Error, Result};

/// Half extents of the simulated room, meters
const ROOM_HALF_WIDTH_M: f64 = 3.0;
const ROOM_HALF_DEPTH_M: f64 = 2.0;
const RAYS_PER_REVOLUTION: usize = 360;
const RANGE_NOISE_STDDEV_M: f64 = 0.01;
/// Pacing of the simulated revolution (the A1 spins at ~10 Hz)
const REVOLUTION_PERIOD: Duration = Duration::from_millis(100);
/// Reported when a scripted ranger runs out of entries
const MAX_CLEAR_CM: f64 = 400.0;

/// Range scanner standing in the middle of an empty rectangular room
pub struct SimScanner {
    scanning: bool,
    scan_number: u64,
    rng: SmallRng,
}

impl SimScanner {
    pub fn new() -> Self {
        Self {
            scanning: false,
            scan_number: 0,
            rng: SmallRng::seed_from_u64(42),
        }
    }

    /// Distance from the room center to the wall along `theta`
    fn wall_distance(theta: f64) -> f64 {
        let cos = theta.cos().abs();
        let sin = theta.sin().abs();
        let mut distance = f64::INFINITY;
        if cos > 1e-9 {
            distance = distance.min(ROOM_HALF_WIDTH_M / cos);
        }
        if sin > 1e-9 {
            distance = distance.min(ROOM_HALF_DEPTH_M / sin);
        }
        distance
    }
}

impl Default for SimScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner for SimScanner {
    fn start(&mut self) -> Result<()> {
        self.scanning = true;
        log::info!(
            "SimScanner: {}x{} m room, {} rays per revolution",
            ROOM_HALF_WIDTH_M * 2.0,
            ROOM_HALF_DEPTH_M * 2.0,
            RAYS_PER_REVOLUTION
        );
        Ok(())
    }

    fn read_scan(&mut self) -> Result<Option<ScanFrame>> {
        if !self.scanning {
            return Ok(None);
        }
        thread::sleep(REVOLUTION_PERIOD);

        let mut ranges = Vec::with_capacity(RAYS_PER_REVOLUTION);
        let mut angles_deg = Vec::with_capacity(RAYS_PER_REVOLUTION);
        for i in 0..RAYS_PER_REVOLUTION {
            let angle_deg = i as f64 * (360.0 / RAYS_PER_REVOLUTION as f64);
            let noise: f64 = self.rng.sample(StandardNormal);
            let distance = Self::wall_distance(angle_deg.to_radians()) + noise * RANGE_NOISE_STDDEV_M;
            ranges.push(distance.max(0.05));
            angles_deg.push(angle_deg);
        }

        let frame = ScanFrame {
            timestamp_us: now_micros(),
            scan_number: self.scan_number,
            ranges,
            angles_deg,
        };
        self.scan_number += 1;
        Ok(Some(frame))
    }

    fn stop(&mut self) -> Result<()> {
        self.scanning = false;
        Ok(())
    }
}

/// Proximity ranger replaying a fixed script
pub struct SimRanger {
    script: Vec<f64>,
    index: usize,
}

impl SimRanger {
    /// Always reports the same clear distance
    pub fn constant(distance_cm: f64) -> Self {
        Self {
            script: vec![distance_cm],
            index: 0,
        }
    }

    /// Cycles through `script` one entry per measurement; a negative entry
    /// reports a timeout instead of a reading
    pub fn scripted(script: Vec<f64>) -> Self {
        let script = if script.is_empty() {
            vec![MAX_CLEAR_CM]
        } else {
            script
        };
        Self { script, index: 0 }
    }
}

impl ProximityRanger for SimRanger {
    fn measure(&mut self) -> Result<f64> {
        let value = self.script[self.index % self.script.len()];
        self.index += 1;
        if value < 0.0 {
            Err(Error::Timeout)
        } else {
            Ok(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_scanner_matches_room_walls() {
        let mut scanner = SimScanner::new();
        scanner.start().unwrap();
        let frame = scanner.read_scan().unwrap().unwrap();

        assert_eq!(frame.ranges.len(), RAYS_PER_REVOLUTION);
        // 0° looks at the near wall on the x axis, 90° on the y axis
        assert!((frame.ranges[0] - ROOM_HALF_WIDTH_M).abs() < 0.1);
        assert!((frame.ranges[90] - ROOM_HALF_DEPTH_M).abs() < 0.1);
        // the corner diagonal is the longest line of sight
        let max = frame.ranges.iter().cloned().fold(0.0, f64::max);
        let diagonal = (ROOM_HALF_WIDTH_M.powi(2) + ROOM_HALF_DEPTH_M.powi(2)).sqrt();
        assert!(max <= diagonal + 0.1);
    }

    #[test]
    fn test_sim_scanner_numbers_revolutions() {
        let mut scanner = SimScanner::new();
        scanner.start().unwrap();
        assert_eq!(scanner.read_scan().unwrap().unwrap().scan_number, 0);
        assert_eq!(scanner.read_scan().unwrap().unwrap().scan_number, 1);
    }

    #[test]
    fn test_sim_scanner_stopped_yields_nothing() {
        let mut scanner = SimScanner::new();
        assert!(scanner.read_scan().unwrap().is_none());
    }

    #[test]
    fn test_sim_ranger_scripted_sequence() {
        let mut ranger = SimRanger::scripted(vec![120.0, 25.0, -1.0]);
        assert_eq!(ranger.measure().unwrap(), 120.0);
        assert_eq!(ranger.measure().unwrap(), 25.0);
        assert!(matches!(ranger.measure(), Err(Error::Timeout)));
        // wraps around
        assert_eq!(ranger.measure().unwrap(), 120.0);
    }

    #[test]
    fn test_sim_ranger_constant() {
        let mut ranger = SimRanger::constant(150.0);
        for _ in 0..5 {
            assert_eq!(ranger.measure().unwrap(), 150.0);
        }
    }
}
