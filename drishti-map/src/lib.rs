//! DrishtiMap - occupancy mapping daemon for the controller node
//!
//! This library holds the controller side of the robot control loop: a
//! log-odds occupancy grid with a Bresenham ray caster, the scan mapper
//! that folds actuator telemetry into it, and the [`setu_link`] session
//! client that receives that telemetry over TCP. The daemon wiring lives
//! in [`threads`] and `main.rs`; everything below it is usable as a
//! library (the benchmarks and integration tests do).
//!
//! Pose estimation is not this crate's job: the mapper integrates every
//! scan at whatever pose it was last given.

pub mod error;
pub mod io;
pub mod mapping;
pub mod state;
pub mod threads;

// Re-export commonly used types
pub use error::{MapError, Result};
pub use mapping::{
    CellState, GridConfig, MapSnapshot, MapperConfig, OccupancyGrid, Pose, RayCells, ScanBatch,
    ScanMapper,
};
pub use state::{create_shared_state, SharedState, SharedStateHandle};
