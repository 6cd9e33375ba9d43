//! Thread-safe shared state for the mapping daemon.
//!
//! The mapper thread is the writer (link status, pose, map snapshot); the
//! main thread reads it for interval status logging, and any future
//! renderer or query surface reads the same slots.

use std::sync::{Arc, RwLock};

use crate::mapping::{BatchDigest, MapSnapshot, MapperStats, Pose};

/// Session link status as seen by the mapper thread.
#[derive(Debug, Clone, Default)]
pub struct LinkStatus {
    /// Whether a session to the actuator is currently established.
    pub connected: bool,
    /// Session id assigned by the actuator (when connected).
    pub session_id: Option<u64>,
    /// Timestamp of the last telemetry frame (microseconds).
    pub last_telemetry_us: Option<u64>,
}

impl LinkStatus {
    /// Age of the last telemetry frame in seconds, if any was received.
    pub fn telemetry_age_s(&self, now_us: u64) -> Option<f64> {
        self.last_telemetry_us
            .map(|t| now_us.saturating_sub(t) as f64 / 1_000_000.0)
    }
}

/// Shared state between the mapper thread and readers.
#[derive(Debug, Default)]
pub struct SharedState {
    /// Session link status.
    pub link: LinkStatus,

    /// Pose the mapper is currently integrating at.
    pub pose: Pose,

    /// Latest tri-state map snapshot, if any batch has been integrated.
    pub map: Option<MapSnapshot>,

    /// Cumulative mapper counters.
    pub mapper_stats: MapperStats,

    /// Digests of recently integrated batches, oldest first.
    pub recent_batches: Vec<BatchDigest>,
}

impl SharedState {
    /// Create a new shared state with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an established session.
    pub fn set_connected(&mut self, session_id: u64) {
        self.link.connected = true;
        self.link.session_id = Some(session_id);
    }

    /// Record a lost or closed session. Telemetry history is kept.
    pub fn set_disconnected(&mut self) {
        self.link.connected = false;
        self.link.session_id = None;
    }

    /// Record the arrival of a telemetry frame.
    pub fn record_telemetry(&mut self, timestamp_us: u64) {
        self.link.last_telemetry_us = Some(timestamp_us);
    }

    /// Publish the mapper's view after an integrated batch.
    pub fn update_map(
        &mut self,
        pose: Pose,
        snapshot: MapSnapshot,
        stats: MapperStats,
        recent_batches: Vec<BatchDigest>,
    ) {
        self.pose = pose;
        self.map = Some(snapshot);
        self.mapper_stats = stats;
        self.recent_batches = recent_batches;
    }
}

/// Handle type for shared state (Arc<RwLock<SharedState>>).
pub type SharedStateHandle = Arc<RwLock<SharedState>>;

/// Create a new shared state wrapped in Arc<RwLock>.
pub fn create_shared_state() -> SharedStateHandle {
    Arc::new(RwLock::new(SharedState::new()))
}
