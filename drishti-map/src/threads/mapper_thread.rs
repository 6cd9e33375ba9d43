//! Mapper thread: owns the session client and the scan mapper.
//!
//! The thread connects to the actuator daemon, folds incoming scan frames
//! into the occupancy grid at the current pose, and publishes a fresh
//! snapshot into shared state after every integrated batch. A lost session
//! is retried for as long as the daemon runs; the map itself survives
//! reconnects, and is written to disk at interval and again on shutdown.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use setu_link::{Event, Frame, ScanFrame, Telemetry};

use crate::io::SessionClient;
use crate::mapping::{MapperConfig, ScanBatch, ScanMapper};
use crate::state::SharedStateHandle;

/// Delay between connection attempts
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Per-receive socket timeout; bounds shutdown latency
const RECV_TIMEOUT: Duration = Duration::from_millis(500);

/// Poll step while waiting out the reconnect delay
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Configuration for the mapper thread.
#[derive(Debug, Clone)]
pub struct MapperThreadConfig {
    /// Actuator daemon address (host:port).
    pub actuator_address: String,

    /// Node name reported in the handshake.
    pub node_name: String,

    /// Mapper and grid parameters.
    pub mapper: MapperConfig,

    /// Map file loaded at startup and written at interval, if set.
    pub save_path: Option<PathBuf>,

    /// Seconds between periodic map saves; 0 saves only on shutdown.
    pub save_interval_s: u64,
}

/// Handle to the running mapper thread.
pub struct MapperThread {
    handle: JoinHandle<()>,
}

impl MapperThread {
    /// Spawn the mapper thread.
    pub fn spawn(
        config: MapperThreadConfig,
        shared_state: SharedStateHandle,
        running: Arc<AtomicBool>,
    ) -> Self {
        let handle = thread::Builder::new()
            .name("mapper".into())
            .spawn(move || run_mapper(config, shared_state, running))
            .expect("Failed to spawn mapper thread");

        Self { handle }
    }

    /// Wait for the thread to finish.
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }
}

fn run_mapper(
    config: MapperThreadConfig,
    shared_state: SharedStateHandle,
    running: Arc<AtomicBool>,
) {
    log::info!("Mapper thread started");
    let mut ctx = MapperContext::new(config, shared_state);

    let mut attempt: u64 = 0;
    while running.load(Ordering::Relaxed) {
        attempt += 1;
        let mut client =
            match SessionClient::connect(&ctx.config.actuator_address, &ctx.config.node_name) {
                Ok(client) => client,
                Err(e) => {
                    // First failure is worth a warning; after that the
                    // retries are routine
                    if attempt == 1 {
                        log::warn!(
                            "Connect to {} failed (will retry): {}",
                            ctx.config.actuator_address,
                            e
                        );
                    } else {
                        log::debug!(
                            "Connect to {} failed (attempt #{}): {}",
                            ctx.config.actuator_address,
                            attempt,
                            e
                        );
                    }
                    idle_wait(&running, RECONNECT_DELAY);
                    continue;
                }
            };
        attempt = 0;

        if let Ok(mut state) = ctx.shared_state.write() {
            state.set_connected(client.session_id());
        }

        ctx.run_session(&mut client, &running);

        if let Ok(mut state) = ctx.shared_state.write() {
            state.set_disconnected();
        }
    }

    ctx.final_save();
    log::info!("Mapper thread stopped");
}

/// Sleep up to `total`, polling the running flag.
fn idle_wait(running: &AtomicBool, total: Duration) {
    let deadline = Instant::now() + total;
    while running.load(Ordering::Relaxed) && Instant::now() < deadline {
        thread::sleep(IDLE_POLL);
    }
}

/// Mapping state that outlives any one session.
struct MapperContext {
    config: MapperThreadConfig,
    shared_state: SharedStateHandle,
    mapper: ScanMapper,
    last_save: Instant,
    /// Batches integrated at the last save, to skip no-op writes
    saved_batches: u64,
}

impl MapperContext {
    fn new(config: MapperThreadConfig, shared_state: SharedStateHandle) -> Self {
        let mut mapper = ScanMapper::new(config.mapper.clone());
        let mut restored = false;

        if let Some(path) = &config.save_path {
            if path.exists() {
                match mapper.load_map(path) {
                    Ok(()) => {
                        let (width, height) = mapper.grid().dimensions();
                        log::info!(
                            "Loaded saved map {} ({}x{} cells)",
                            path.display(),
                            width,
                            height
                        );
                        restored = true;
                    }
                    Err(e) => log::warn!("Ignoring saved map {}: {}", path.display(), e),
                }
            }
        }

        let ctx = Self {
            config,
            shared_state,
            mapper,
            last_save: Instant::now(),
            saved_batches: 0,
        };
        // Make a restored map visible before the first scan arrives
        if restored {
            ctx.publish();
        }
        ctx
    }

    /// Receive loop for one established session.
    ///
    /// Returns when the session drops or the daemon shuts down.
    fn run_session(&mut self, client: &mut SessionClient, running: &AtomicBool) {
        while running.load(Ordering::Relaxed) {
            match client.recv_timeout(RECV_TIMEOUT) {
                Ok(Some(frame)) => self.handle_frame(frame),
                Ok(None) => {} // quiet link; periodic work below still runs
                Err(e) => {
                    log::warn!("Session lost: {}", e);
                    return;
                }
            }
            self.maybe_save();
        }
    }

    fn handle_frame(&mut self, frame: Frame) {
        match frame {
            Frame::Telemetry(Telemetry::Scan(scan)) => self.integrate_scan(scan),
            Frame::Telemetry(Telemetry::Proximity(reading)) => {
                log::trace!("Proximity: {:.1} cm", reading.distance_cm);
                if let Ok(mut state) = self.shared_state.write() {
                    state.record_telemetry(reading.timestamp_us);
                }
            }
            Frame::Event(event) => handle_event(event),
            other => log::debug!("Ignoring unexpected {} frame", other.name()),
        }
    }

    fn integrate_scan(&mut self, scan: ScanFrame) {
        let batch = ScanBatch {
            sequence: scan.scan_number,
            timestamp_us: scan.timestamp_us,
            ranges: scan.ranges,
            angles_deg: scan.angles_deg,
            pose: self.mapper.pose(),
        };

        match self.mapper.update(&batch) {
            Ok(()) => {
                log::debug!(
                    "Integrated scan {} ({} samples)",
                    batch.sequence,
                    batch.ranges.len()
                );
                self.publish();
            }
            // Malformed batches are dropped here; the link stays up
            Err(e) => log::warn!("Dropped scan {}: {}", batch.sequence, e),
        }

        if let Ok(mut state) = self.shared_state.write() {
            state.record_telemetry(batch.timestamp_us);
        }
    }

    /// Publish the mapper's current view into shared state.
    fn publish(&self) {
        if let Ok(mut state) = self.shared_state.write() {
            state.update_map(
                self.mapper.pose(),
                self.mapper.snapshot(),
                self.mapper.stats(),
                self.mapper.recent_batches(),
            );
        }
    }

    /// Write the map to disk when the save interval has elapsed.
    fn maybe_save(&mut self) {
        if self.config.save_interval_s == 0 {
            return;
        }
        if self.last_save.elapsed() < Duration::from_secs(self.config.save_interval_s) {
            return;
        }
        self.last_save = Instant::now();
        self.save_if_dirty();
    }

    /// Write the map if any batch landed since the last successful save.
    fn save_if_dirty(&mut self) {
        let integrated = self.mapper.stats().batches_integrated;
        if integrated == self.saved_batches {
            return;
        }
        if let Some(path) = &self.config.save_path {
            match self.mapper.save_map(path) {
                Ok(()) => {
                    self.saved_batches = integrated;
                    log::debug!("Saved map to {}", path.display());
                }
                Err(e) => log::warn!("Map save to {} failed: {}", path.display(), e),
            }
        }
    }

    fn final_save(&mut self) {
        self.save_if_dirty();
    }
}

fn handle_event(event: Event) {
    match event {
        Event::CommandCompleted {
            direction,
            duration_s,
        } => {
            log::info!("Actuator completed {} after {:.1}s", direction, duration_s);
        }
        Event::ObstacleStop { distance_cm } => {
            log::warn!("Actuator stopped for obstacle at {:.1} cm", distance_cm);
        }
        Event::CommandRejected { reason } => {
            log::warn!("Actuator rejected command: {}", reason);
        }
        Event::Connectivity { connected } => {
            log::info!(
                "Actuator session {}",
                if connected { "established" } else { "closed" }
            );
        }
    }
}
