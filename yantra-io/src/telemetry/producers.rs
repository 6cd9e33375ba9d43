//! Sensor polling threads

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_queue::ArrayQueue;

use setu_link::{now_micros, ProximityReading, ScanFrame};

use crate::error::Result;
use crate::safety::SafetyController;
use crate::sensors::{ProximityRanger, Scanner};

/// Wait between scan read errors before retrying
const SCAN_RETRY_PAUSE: Duration = Duration::from_millis(200);
/// Scan read errors in a row before the device is restarted
const SCAN_ERRORS_BEFORE_RESTART: u64 = 10;

/// Spawn the scan producer thread. Reads revolutions from the scanner and
/// force-pushes them into `queue`; on persistent read errors the device is
/// stopped and restarted.
pub fn spawn_scan_producer(
    mut scanner: Box<dyn Scanner>,
    queue: Arc<ArrayQueue<ScanFrame>>,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("scan-producer".to_string())
        .spawn(move || {
            if let Err(e) = scanner.start() {
                log::error!("Telemetry: scanner start failed: {}", e);
                return;
            }

            let mut published = 0u64;
            let mut dropped = 0u64;
            let mut consecutive_errors = 0u64;

            while running.load(Ordering::Relaxed) {
                match scanner.read_scan() {
                    Ok(Some(frame)) => {
                        consecutive_errors = 0;
                        published += 1;
                        if queue.force_push(frame).is_some() {
                            dropped += 1;
                            if dropped % 100 == 0 {
                                log::debug!("Telemetry: {} scan frames dropped unread", dropped);
                            }
                        }
                        if published % 100 == 0 {
                            log::debug!("Telemetry: {} scans published", published);
                        }
                    }
                    Ok(None) => thread::sleep(Duration::from_millis(100)),
                    Err(e) => {
                        consecutive_errors += 1;
                        if consecutive_errors == 1 || consecutive_errors % 50 == 0 {
                            log::warn!(
                                "Telemetry: scan read failed ({} in a row): {}",
                                consecutive_errors,
                                e
                            );
                        }
                        if consecutive_errors % SCAN_ERRORS_BEFORE_RESTART == 0 {
                            log::info!("Telemetry: restarting scanner");
                            if let Err(e) = scanner.stop().and_then(|_| scanner.start()) {
                                log::warn!("Telemetry: scanner restart failed: {}", e);
                            }
                        }
                        thread::sleep(SCAN_RETRY_PAUSE);
                    }
                }
            }

            if let Err(e) = scanner.stop() {
                log::warn!("Telemetry: scanner stop failed: {}", e);
            }
            log::info!("Telemetry: scan producer stopped ({} scans)", published);
        })?;
    Ok(handle)
}

/// Spawn the proximity producer thread. Every poll interval it measures
/// once, feeds the safety machine, and publishes the reading. Failed
/// measurements are reported to the machine as timeouts so the override
/// never silently clears.
pub fn spawn_proximity_producer(
    mut ranger: Box<dyn ProximityRanger>,
    safety: Arc<SafetyController>,
    queue: Arc<ArrayQueue<ProximityReading>>,
    poll: Duration,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("proximity-producer".to_string())
        .spawn(move || {
            let mut dropped = 0u64;
            let mut consecutive_timeouts = 0u64;

            while running.load(Ordering::Relaxed) {
                let tick_start = Instant::now();
                match ranger.measure() {
                    Ok(distance_cm) => {
                        consecutive_timeouts = 0;
                        if let Err(e) = safety.proximity_sample(distance_cm) {
                            log::error!("Telemetry: obstacle stop failed: {}", e);
                        }
                        let reading = ProximityReading {
                            timestamp_us: now_micros(),
                            distance_cm,
                        };
                        if queue.force_push(reading).is_some() {
                            dropped += 1;
                            if dropped % 100 == 0 {
                                log::debug!("Telemetry: {} proximity readings dropped unread", dropped);
                            }
                        }
                    }
                    Err(e) => {
                        safety.proximity_timeout();
                        consecutive_timeouts += 1;
                        if consecutive_timeouts == 1 || consecutive_timeouts % 20 == 0 {
                            log::warn!(
                                "Telemetry: proximity read failed ({} in a row): {}",
                                consecutive_timeouts,
                                e
                            );
                        }
                    }
                }

                // hold the cadence regardless of how long the measure took
                if let Some(rest) = poll.checked_sub(tick_start.elapsed()) {
                    thread::sleep(rest);
                }
            }
            log::info!("Telemetry: proximity producer stopped");
        })?;
    Ok(handle)
}
