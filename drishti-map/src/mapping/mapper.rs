//! Scan-to-grid integration.
//!
//! The mapper owns the occupancy grid and the current pose estimate. Scan
//! batches arrive with the pose at capture time; every in-window sample is
//! cast as a ray of free cells ending in one occupied cell. Pose updates
//! come from outside (odometry and localization are not this daemon's job).

use std::collections::VecDeque;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MapError, Result};
use crate::mapping::{GridConfig, MapSnapshot, OccupancyGrid, RayCells};

/// Retained per-batch digests for status queries
const DIGEST_CAPACITY: usize = 32;

/// Robot pose in grid-cell units (x, y) and radians (theta).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

/// One scan revolution plus the pose it was captured at.
///
/// Transient: built per telemetry message, consumed by one `update` call.
#[derive(Debug, Clone)]
pub struct ScanBatch {
    /// Monotonic revolution counter from the scanner.
    pub sequence: u64,
    /// Capture timestamp in microseconds since epoch.
    pub timestamp_us: u64,
    /// Measured distances in meters.
    pub ranges: Vec<f64>,
    /// Beam angles in degrees, sensor convention.
    pub angles_deg: Vec<f64>,
    /// Pose at capture time.
    pub pose: Pose,
}

/// Configuration for the scan mapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapperConfig {
    /// Minimum valid range in meters; shorter returns are discarded.
    pub range_min_m: f64,

    /// Maximum valid range in meters; longer returns are discarded.
    pub range_max_m: f64,

    /// Pose the mapper starts at and returns to on reset.
    pub origin: Pose,

    /// Grid geometry and belief parameters.
    pub grid: GridConfig,
}

impl Default for MapperConfig {
    fn default() -> Self {
        let grid = GridConfig::default();
        let origin = Pose::new(grid.width as f64 / 2.0, grid.height as f64 / 2.0, 0.0);
        Self {
            range_min_m: 0.15,
            range_max_m: 12.0,
            origin,
            grid,
        }
    }
}

/// Summary of one integrated batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchDigest {
    pub sequence: u64,
    /// Samples in the batch.
    pub samples: usize,
    /// Samples that passed the range window.
    pub accepted: usize,
    pub timestamp_us: u64,
}

/// Cumulative mapper counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapperStats {
    pub batches_integrated: u64,
    pub batches_dropped: u64,
    pub samples_accepted: u64,
    pub samples_discarded: u64,
}

/// Owns the grid and integrates scan batches into it.
pub struct ScanMapper {
    config: MapperConfig,
    grid: OccupancyGrid,
    pose: Pose,
    digests: VecDeque<BatchDigest>,
    stats: MapperStats,
}

impl ScanMapper {
    /// Create a mapper with a fresh all-unknown grid at the configured origin.
    pub fn new(config: MapperConfig) -> Self {
        let grid = OccupancyGrid::new(config.grid.clone());
        let pose = config.origin;
        Self {
            config,
            grid,
            pose,
            digests: VecDeque::with_capacity(DIGEST_CAPACITY),
            stats: MapperStats::default(),
        }
    }

    /// Current pose estimate.
    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Install an externally supplied pose estimate.
    pub fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }

    /// Read access to the grid.
    pub fn grid(&self) -> &OccupancyGrid {
        &self.grid
    }

    /// Cumulative counters. Survive `reset`.
    pub fn stats(&self) -> MapperStats {
        self.stats
    }

    /// Digests of the most recently integrated batches, oldest first.
    pub fn recent_batches(&self) -> Vec<BatchDigest> {
        self.digests.iter().copied().collect()
    }

    /// Derive a tri-state snapshot of the grid.
    pub fn snapshot(&self) -> MapSnapshot {
        self.grid.snapshot()
    }

    /// Integrate one scan batch into the grid.
    ///
    /// Samples outside the valid-range window are discarded without error.
    /// Each remaining sample casts free cells from the batch pose to the
    /// endpoint, then marks the endpoint occupied; the start cell itself is
    /// never touched. Cells beyond the grid edge are clipped silently.
    ///
    /// A batch whose ranges and angles differ in length is rejected whole
    /// with `MalformedScan`; the grid is not mutated.
    pub fn update(&mut self, batch: &ScanBatch) -> Result<()> {
        if batch.ranges.len() != batch.angles_deg.len() {
            self.stats.batches_dropped += 1;
            return Err(MapError::MalformedScan {
                ranges: batch.ranges.len(),
                angles: batch.angles_deg.len(),
            });
        }

        // Geometry follows the grid actually installed (a loaded map may
        // differ from the configured one)
        let resolution = self.grid.resolution();
        let start_x = batch.pose.x.round() as i32;
        let start_y = batch.pose.y.round() as i32;

        let mut accepted = 0usize;
        let mut discarded = 0usize;

        for (&range, &angle_deg) in batch.ranges.iter().zip(batch.angles_deg.iter()) {
            if !(range >= self.config.range_min_m && range <= self.config.range_max_m) {
                discarded += 1;
                continue;
            }

            let heading = batch.pose.theta + angle_deg.to_radians();
            let cells = range / resolution;
            let end_x = (batch.pose.x + cells * heading.cos()).round() as i32;
            let end_y = (batch.pose.y + cells * heading.sin()).round() as i32;

            for (cx, cy) in RayCells::new(start_x, start_y, end_x, end_y) {
                if cx == start_x && cy == start_y {
                    continue;
                }
                let hit = cx == end_x && cy == end_y;
                self.grid.update_cell_signed(cx, cy, hit);
            }

            accepted += 1;
        }

        self.stats.batches_integrated += 1;
        self.stats.samples_accepted += accepted as u64;
        self.stats.samples_discarded += discarded as u64;

        if self.digests.len() == DIGEST_CAPACITY {
            self.digests.pop_front();
        }
        self.digests.push_back(BatchDigest {
            sequence: batch.sequence,
            samples: batch.ranges.len(),
            accepted,
            timestamp_us: batch.timestamp_us,
        });

        Ok(())
    }

    /// Reinitialize the grid to unknown and the pose to the configured origin.
    ///
    /// Cumulative counters are kept; the digest ring is cleared.
    pub fn reset(&mut self) {
        self.grid.clear();
        self.pose = self.config.origin;
        self.digests.clear();
    }

    /// Save the grid to a binary map file.
    pub fn save_map<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.grid.save(path)
    }

    /// Replace the grid with one loaded from a map file.
    ///
    /// Belief parameters stay as configured; geometry comes from the file.
    pub fn load_map<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.grid = OccupancyGrid::load(path, self.config.grid.clone())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::CellState;

    /// 10x10 grid at 0.1 m/cell with the origin pose at its center.
    fn test_mapper() -> ScanMapper {
        let grid = GridConfig {
            width: 10,
            height: 10,
            resolution: 0.1,
            ..Default::default()
        };
        ScanMapper::new(MapperConfig {
            origin: Pose::new(5.0, 5.0, 0.0),
            grid,
            ..Default::default()
        })
    }

    fn batch_at(pose: Pose, ranges: Vec<f64>, angles_deg: Vec<f64>) -> ScanBatch {
        ScanBatch {
            sequence: 1,
            timestamp_us: 1_000,
            ranges,
            angles_deg,
            pose,
        }
    }

    #[test]
    fn test_single_ray_hits_endpoint_and_frees_path() {
        let mut mapper = test_mapper();
        let batch = batch_at(mapper.pose(), vec![0.3], vec![0.0]);

        mapper.update(&batch).unwrap();

        // 0.3m at 0.1 m/cell from (5,5) heading 0: endpoint (8,5)
        assert!(mapper.grid().get_log_odds(8, 5) > 0.0, "endpoint occupied");
        assert!(mapper.grid().get_log_odds(6, 5) < 0.0, "path freed");
        assert!(mapper.grid().get_log_odds(7, 5) < 0.0, "path freed");
        assert_eq!(mapper.grid().get_log_odds(5, 5), 0.0, "start cell untouched");
    }

    #[test]
    fn test_angle_degrees_rotate_the_ray() {
        let mut mapper = test_mapper();
        let batch = batch_at(mapper.pose(), vec![0.3], vec![90.0]);

        mapper.update(&batch).unwrap();

        assert!(mapper.grid().get_log_odds(5, 8) > 0.0);
        assert!(mapper.grid().get_log_odds(5, 6) < 0.0);
        assert!(mapper.grid().get_log_odds(5, 7) < 0.0);
        // Nothing along the heading-0 direction
        assert_eq!(mapper.grid().get_log_odds(8, 5), 0.0);
    }

    #[test]
    fn test_pose_theta_composes_with_beam_angle() {
        let mut mapper = test_mapper();
        let pose = Pose::new(5.0, 5.0, std::f64::consts::FRAC_PI_2);
        let batch = batch_at(pose, vec![0.3], vec![0.0]);

        mapper.update(&batch).unwrap();

        // Beam at sensor angle 0 with pose facing +y lands at (5,8)
        assert!(mapper.grid().get_log_odds(5, 8) > 0.0);
    }

    #[test]
    fn test_out_of_window_samples_touch_nothing() {
        let mut mapper = test_mapper();
        let batch = batch_at(mapper.pose(), vec![0.05, 50.0], vec![0.0, 90.0]);

        mapper.update(&batch).unwrap();

        let (free, unknown, occupied) = mapper.grid().count_cells();
        assert_eq!((free, unknown, occupied), (0, 100, 0));

        let stats = mapper.stats();
        assert_eq!(stats.batches_integrated, 1);
        assert_eq!(stats.samples_accepted, 0);
        assert_eq!(stats.samples_discarded, 2);
    }

    #[test]
    fn test_malformed_batch_rejected_without_mutation() {
        let mut mapper = test_mapper();
        let batch = batch_at(mapper.pose(), vec![0.3, 0.4], vec![0.0]);

        match mapper.update(&batch) {
            Err(MapError::MalformedScan { ranges: 2, angles: 1 }) => {}
            other => panic!("expected MalformedScan, got {:?}", other),
        }

        let (_, unknown, _) = mapper.grid().count_cells();
        assert_eq!(unknown, 100);
        assert_eq!(mapper.stats().batches_dropped, 1);
        assert_eq!(mapper.stats().batches_integrated, 0);
        assert!(mapper.recent_batches().is_empty());
    }

    #[test]
    fn test_off_grid_endpoint_clipped_silently() {
        let mut mapper = test_mapper();
        // 12m at 0.1 m/cell is 120 cells, far beyond a 10-cell grid
        let batch = batch_at(mapper.pose(), vec![12.0], vec![0.0]);

        mapper.update(&batch).unwrap();

        // The in-grid part of the ray is freed, the endpoint never lands
        assert!(mapper.grid().get_log_odds(9, 5) < 0.0);
        let (_, _, occupied) = mapper.grid().count_cells();
        assert_eq!(occupied, 0);
        assert_eq!(mapper.stats().samples_accepted, 1);
    }

    #[test]
    fn test_digest_ring_is_bounded() {
        let mut mapper = test_mapper();

        for sequence in 0..40 {
            let mut batch = batch_at(mapper.pose(), vec![0.3], vec![0.0]);
            batch.sequence = sequence;
            batch.timestamp_us = sequence * 100;
            mapper.update(&batch).unwrap();
        }

        let digests = mapper.recent_batches();
        assert_eq!(digests.len(), 32);
        assert_eq!(digests[0].sequence, 8);
        assert_eq!(digests[31].sequence, 39);
        assert_eq!(digests[0].samples, 1);
        assert_eq!(digests[0].accepted, 1);
    }

    #[test]
    fn test_reset_restores_origin_and_unknown_grid() {
        let mut mapper = test_mapper();
        let batch = batch_at(mapper.pose(), vec![0.3], vec![0.0]);
        mapper.update(&batch).unwrap();
        mapper.set_pose(Pose::new(2.0, 2.0, 1.0));

        mapper.reset();

        assert_eq!(mapper.pose(), Pose::new(5.0, 5.0, 0.0));
        let (_, unknown, _) = mapper.grid().count_cells();
        assert_eq!(unknown, 100);
        assert!(mapper.recent_batches().is_empty());
        // Counters are lifetime totals
        assert_eq!(mapper.stats().batches_integrated, 1);
    }

    #[test]
    fn test_set_pose_moves_subsequent_rays() {
        let mut mapper = test_mapper();
        mapper.set_pose(Pose::new(2.0, 2.0, 0.0));
        let batch = batch_at(mapper.pose(), vec![0.3], vec![0.0]);

        mapper.update(&batch).unwrap();

        assert!(mapper.grid().get_log_odds(5, 2) > 0.0);
        assert_eq!(mapper.grid().get_log_odds(2, 2), 0.0);
    }

    #[test]
    fn test_snapshot_thresholds() {
        let mut mapper = test_mapper();

        // Default deltas (0.9 hit, -0.7 miss) cross both thresholds in one batch
        let batch = batch_at(mapper.pose(), vec![0.3], vec![0.0]);
        mapper.update(&batch).unwrap();

        let snapshot = mapper.snapshot();
        assert_eq!(snapshot.state(8, 5), CellState::Occupied);
        assert_eq!(snapshot.state(6, 5), CellState::Free);
        assert_eq!(snapshot.state(5, 5), CellState::Unknown);
    }

    #[test]
    fn test_save_and_load_map_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapper.map");

        let mut mapper = test_mapper();
        let batch = batch_at(mapper.pose(), vec![0.3], vec![0.0]);
        mapper.update(&batch).unwrap();
        mapper.save_map(&path).unwrap();

        let mut restored = test_mapper();
        restored.load_map(&path).unwrap();

        assert_eq!(
            restored.grid().get_log_odds(8, 5),
            mapper.grid().get_log_odds(8, 5)
        );
        assert_eq!(restored.grid().dimensions(), (10, 10));
    }
}
