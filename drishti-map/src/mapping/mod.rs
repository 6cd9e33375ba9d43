//! Occupancy mapping: ray casting, the log-odds grid, and scan integration.

mod grid;
mod mapper;
mod ray;

pub use grid::{CellState, GridConfig, MapSnapshot, OccupancyGrid};
pub use mapper::{BatchDigest, MapperConfig, MapperStats, Pose, ScanBatch, ScanMapper};
pub use ray::RayCells;
