//! Telemetry production
//!
//! Two producer threads poll the sensor devices and push into the bounded
//! publish queues. Pushes never block; when no controller is draining, the
//! oldest entry is dropped so a session always starts with fresh data.

mod producers;

pub use producers::{spawn_proximity_producer, spawn_scan_producer};
