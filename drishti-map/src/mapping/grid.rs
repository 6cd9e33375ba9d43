//! Occupancy grid map with log-odds cells.
//!
//! Each cell holds the log-odds of being occupied:
//!
//! ```text
//! P(occupied) = 1 / (1 + exp(-log_odds))
//!
//! Update: log_odds_new = clamp(log_odds_old + log_odds_observation)
//! ```
//!
//! Addition is the whole Bayesian update, values clamp cleanly, and the
//! probability extremes stay numerically tame. The grid has fixed
//! dimensions chosen at construction; rays that leave it are clipped by
//! the mapper, never grown into.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MapError, Result};

// Map file format constants
const MAP_MAGIC: u32 = 0x444D4150; // "DMAP"
const MAP_VERSION: u32 = 1;

/// Upper bound on cells accepted from a map file header
const MAX_FILE_CELLS: usize = 1 << 26;

/// Cell state for visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    /// Unknown (never observed)
    Unknown,
    /// Free space (definitely empty)
    Free,
    /// Occupied (definitely contains obstacle)
    Occupied,
}

/// Configuration for the occupancy grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Grid width in cells.
    pub width: usize,

    /// Grid height in cells.
    pub height: usize,

    /// Cell size in meters.
    pub resolution: f64,

    /// Log-odds value for occupied observation.
    ///
    /// Higher = more confident. Typical: 0.9
    pub log_odds_occupied: f32,

    /// Log-odds value for free observation.
    ///
    /// Negative value. Typical: -0.7
    pub log_odds_free: f32,

    /// Maximum log-odds value (clamp).
    ///
    /// Prevents overconfidence. Typical: 50.0
    pub log_odds_max: f32,

    /// Minimum log-odds value (clamp).
    ///
    /// Prevents overconfidence. Typical: -50.0
    pub log_odds_min: f32,

    /// Log-odds threshold for considering a cell occupied.
    pub occupied_threshold: f32,

    /// Log-odds threshold for considering a cell free.
    pub free_threshold: f32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: 400,       // 20m at 5cm cells
            height: 400,
            resolution: 0.05, // 5cm cells
            log_odds_occupied: 0.9,
            log_odds_free: -0.7,
            log_odds_max: 50.0,
            log_odds_min: -50.0,
            occupied_threshold: 0.5,
            free_threshold: -0.5,
        }
    }
}

/// 2D occupancy grid map.
///
/// Stores log-odds values for each cell. Dimensions are fixed at
/// construction.
#[derive(Debug)]
pub struct OccupancyGrid {
    config: GridConfig,

    /// Grid cells (log-odds values).
    ///
    /// Row-major storage: index = y * width + x
    cells: Vec<f32>,
}

impl OccupancyGrid {
    /// Create a new grid with every cell unknown.
    pub fn new(config: GridConfig) -> Self {
        let cells = vec![0.0; config.width * config.height]; // 0.0 = unknown
        Self { config, cells }
    }

    /// Create from raw data (used by the loader).
    fn from_raw(config: GridConfig, cells: Vec<f32>) -> Self {
        Self { config, cells }
    }

    /// Get the configuration.
    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Get grid width in cells.
    pub fn width(&self) -> usize {
        self.config.width
    }

    /// Get grid height in cells.
    pub fn height(&self) -> usize {
        self.config.height
    }

    /// Get grid dimensions.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.config.width, self.config.height)
    }

    /// Get the resolution in meters per cell.
    pub fn resolution(&self) -> f64 {
        self.config.resolution
    }

    /// Check if cell indices are valid.
    #[inline]
    pub fn is_valid_cell(&self, cx: i32, cy: i32) -> bool {
        cx >= 0
            && cy >= 0
            && (cx as usize) < self.config.width
            && (cy as usize) < self.config.height
    }

    /// Get the cell index for array access.
    #[inline]
    fn cell_index(&self, cx: usize, cy: usize) -> usize {
        cy * self.config.width + cx
    }

    /// Get log-odds value at cell.
    ///
    /// Returns 0.0 (unknown) for out-of-bounds cells.
    #[inline]
    pub fn get_log_odds(&self, cx: usize, cy: usize) -> f32 {
        if cx < self.config.width && cy < self.config.height {
            self.cells[self.cell_index(cx, cy)]
        } else {
            0.0
        }
    }

    /// Get log-odds value at signed cell indices.
    #[inline]
    pub fn get_log_odds_signed(&self, cx: i32, cy: i32) -> f32 {
        if self.is_valid_cell(cx, cy) {
            self.cells[self.cell_index(cx as usize, cy as usize)]
        } else {
            0.0
        }
    }

    /// Get cell state (for visualization).
    pub fn get_state(&self, cx: usize, cy: usize) -> CellState {
        classify(
            self.get_log_odds(cx, cy),
            self.config.occupied_threshold,
            self.config.free_threshold,
        )
    }

    /// Get occupancy probability (0.0 to 1.0).
    pub fn get_probability(&self, cx: usize, cy: usize) -> f32 {
        let log_odds = self.get_log_odds(cx, cy);
        1.0 / (1.0 + (-log_odds).exp())
    }

    /// Update a cell with an observation.
    ///
    /// If `occupied` is true, adds `log_odds_occupied`.
    /// If false, adds `log_odds_free`.
    #[inline]
    pub fn update_cell(&mut self, cx: usize, cy: usize, occupied: bool) {
        if cx >= self.config.width || cy >= self.config.height {
            return;
        }

        let idx = self.cell_index(cx, cy);
        let delta = if occupied {
            self.config.log_odds_occupied
        } else {
            self.config.log_odds_free
        };

        self.cells[idx] =
            (self.cells[idx] + delta).clamp(self.config.log_odds_min, self.config.log_odds_max);
    }

    /// Update a cell at signed indices. Out-of-bounds cells are ignored.
    #[inline]
    pub fn update_cell_signed(&mut self, cx: i32, cy: i32, occupied: bool) {
        if self.is_valid_cell(cx, cy) {
            self.update_cell(cx as usize, cy as usize, occupied);
        }
    }

    /// Reset all cells to unknown.
    pub fn clear(&mut self) {
        self.cells.fill(0.0);
    }

    /// Count cells by state.
    ///
    /// Returns (free, unknown, occupied).
    pub fn count_cells(&self) -> (usize, usize, usize) {
        let mut free = 0;
        let mut unknown = 0;
        let mut occupied = 0;

        for &log_odds in &self.cells {
            match classify(
                log_odds,
                self.config.occupied_threshold,
                self.config.free_threshold,
            ) {
                CellState::Free => free += 1,
                CellState::Unknown => unknown += 1,
                CellState::Occupied => occupied += 1,
            }
        }

        (free, unknown, occupied)
    }

    /// Derive a tri-state snapshot of the whole grid.
    ///
    /// Pure read; the returned snapshot is detached from later updates.
    pub fn snapshot(&self) -> MapSnapshot {
        let cells = self
            .cells
            .iter()
            .map(|&log_odds| {
                classify(
                    log_odds,
                    self.config.occupied_threshold,
                    self.config.free_threshold,
                )
            })
            .collect();

        MapSnapshot {
            width: self.config.width,
            height: self.config.height,
            cells,
        }
    }

    /// Save map to a binary file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        writer.write_all(&MAP_MAGIC.to_le_bytes())?;
        writer.write_all(&MAP_VERSION.to_le_bytes())?;
        writer.write_all(&(self.config.width as u32).to_le_bytes())?;
        writer.write_all(&(self.config.height as u32).to_le_bytes())?;
        writer.write_all(&self.config.resolution.to_le_bytes())?;

        for &cell in &self.cells {
            writer.write_all(&cell.to_le_bytes())?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Load map from a binary file.
    ///
    /// Geometry (dimensions and resolution) comes from the file; belief
    /// parameters (log-odds deltas, clamps, thresholds) come from `config`.
    pub fn load<P: AsRef<Path>>(path: P, mut config: GridConfig) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let magic = read_u32(&mut reader)?;
        if magic != MAP_MAGIC {
            return Err(MapError::BadMapFile(format!(
                "bad magic 0x{:08X}",
                magic
            )));
        }

        let version = read_u32(&mut reader)?;
        if version != MAP_VERSION {
            return Err(MapError::BadMapFile(format!(
                "unsupported version {}",
                version
            )));
        }

        let width = read_u32(&mut reader)? as usize;
        let height = read_u32(&mut reader)? as usize;
        let resolution = read_f64(&mut reader)?;

        let cell_count = width.saturating_mul(height);
        if cell_count == 0 || cell_count > MAX_FILE_CELLS {
            return Err(MapError::BadMapFile(format!(
                "unreasonable dimensions {}x{}",
                width, height
            )));
        }

        let mut cells = Vec::with_capacity(cell_count);
        let mut buf = [0u8; 4];
        for _ in 0..cell_count {
            reader.read_exact(&mut buf)?;
            cells.push(f32::from_le_bytes(buf));
        }

        config.width = width;
        config.height = height;
        config.resolution = resolution;

        Ok(Self::from_raw(config, cells))
    }
}

/// Read-only tri-state view of a grid at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapSnapshot {
    width: usize,
    height: usize,
    /// Row-major storage: index = y * width + x
    cells: Vec<CellState>,
}

impl MapSnapshot {
    /// Snapshot width in cells.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Snapshot height in cells.
    pub fn height(&self) -> usize {
        self.height
    }

    /// State of one cell. Out-of-bounds reads are Unknown.
    pub fn state(&self, cx: usize, cy: usize) -> CellState {
        if cx < self.width && cy < self.height {
            self.cells[cy * self.width + cx]
        } else {
            CellState::Unknown
        }
    }

    /// Count cells by state.
    ///
    /// Returns (free, unknown, occupied).
    pub fn count_cells(&self) -> (usize, usize, usize) {
        let mut free = 0;
        let mut unknown = 0;
        let mut occupied = 0;

        for state in &self.cells {
            match state {
                CellState::Free => free += 1,
                CellState::Unknown => unknown += 1,
                CellState::Occupied => occupied += 1,
            }
        }

        (free, unknown, occupied)
    }

    /// Export as grayscale image data.
    ///
    /// Returns (width, height, pixels) where pixels are 0-255 grayscale values.
    /// 0 = occupied, 128 = unknown, 255 = free
    pub fn to_grayscale(&self) -> (usize, usize, Vec<u8>) {
        let pixels = self
            .cells
            .iter()
            .map(|state| match state {
                CellState::Free => 255u8,
                CellState::Unknown => 128u8,
                CellState::Occupied => 0u8,
            })
            .collect();

        (self.width, self.height, pixels)
    }
}

#[inline]
fn classify(log_odds: f32, occupied_threshold: f32, free_threshold: f32) -> CellState {
    if log_odds >= occupied_threshold {
        CellState::Occupied
    } else if log_odds <= free_threshold {
        CellState::Free
    } else {
        CellState::Unknown
    }
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_f64<R: Read>(reader: &mut R) -> Result<f64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}
