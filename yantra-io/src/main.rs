//! YantraIO - actuator and sensor daemon
//!
//! ## Thread layout
//!
//! - **main**: wiring, then a status loop that watches for the halted flag
//! - **session-server**: accepts the controller's TCP connection and runs
//!   the handshake; spawns one receive and one send thread per session
//! - **scan-producer / proximity-producer**: poll the sensors and feed the
//!   telemetry queues; the proximity producer also feeds the safety machine
//! - **drive-watchdog**: expires timed drive commands
//!
//! Exactly one controller session is live at a time. A second connection
//! displaces the first, and every disconnect forces the drive to stop.

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use yantra_io::config::AppConfig;
use yantra_io::drive::{self, DriveGuard};
use yantra_io::error::{Error, Result};
use yantra_io::safety::SafetyController;
use yantra_io::sensors::{open_ranger, open_scanner};
use yantra_io::server::{SessionServer, TelemetryQueues};
use yantra_io::telemetry::{spawn_proximity_producer, spawn_scan_producer};

/// Interval between status lines in the log
const STATUS_INTERVAL: Duration = Duration::from_secs(30);

/// Main loop poll interval
const MAIN_POLL: Duration = Duration::from_millis(200);

/// Parse config path from command line arguments.
///
/// Supports:
/// - `yantra-io <path>` (positional)
/// - `yantra-io --config <path>` (flag-based)
/// - `yantra-io -c <path>` (short flag)
///
/// Defaults to `/etc/yantra-io.toml` if not specified.
fn parse_config_path() -> String {
    let args: Vec<String> = env::args().collect();

    // Look for --config or -c flag
    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }

    // Fall back to first positional argument (if it doesn't start with -)
    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    // Default path
    "/etc/yantra-io.toml".to_string()
}

fn main() -> Result<()> {
    // The log filter default comes from the config, so the file is read
    // before the logger exists; the outcome is logged right after init.
    let config_path = parse_config_path();
    let (config, config_note) = if std::path::Path::new(&config_path).exists() {
        (
            AppConfig::from_file(&config_path)?,
            format!("Using config: {}", config_path),
        )
    } else {
        (
            AppConfig::default(),
            format!("Config {} not found, using defaults", config_path),
        )
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("YantraIO v0.1.0 starting...");
    log::info!("{}", config_note);

    // Set up shutdown signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    // Drive outputs, guarded so the lines go low again no matter how the
    // process leaves main
    let outputs = drive::open_outputs(&config.drive)?;
    let outputs = Box::new(DriveGuard::acquire(outputs)?);
    log::info!("Drive: {} outputs ready", config.drive.device);

    let queues = TelemetryQueues::new();
    let safety = Arc::new(SafetyController::new(
        outputs,
        config.safety.obstacle_threshold_cm,
        Arc::clone(&queues.events),
    )?);
    log::info!(
        "Safety: obstacle threshold {:.1} cm, proximity poll {} ms",
        config.safety.obstacle_threshold_cm,
        config.safety.proximity_poll_ms
    );

    // Sensor producer threads
    let scanner = open_scanner(&config.scanner)?;
    let ranger = open_ranger(&config.ranger)?;
    let scan_producer =
        spawn_scan_producer(scanner, Arc::clone(&queues.scans), Arc::clone(&running))?;
    let proximity_producer = spawn_proximity_producer(
        ranger,
        Arc::clone(&safety),
        Arc::clone(&queues.proximity),
        Duration::from_millis(config.safety.proximity_poll_ms),
        Arc::clone(&running),
    )?;

    // Controller session server
    let server = SessionServer::start(
        &config.server,
        Arc::clone(&safety),
        queues.clone(),
        Arc::clone(&running),
    )?;

    log::info!("YantraIO running. Press Ctrl-C to stop.");

    // Watch for the halted flag; a machine that can no longer guarantee
    // deasserted outputs must not keep serving commands
    let mut last_status = Instant::now();
    while running.load(Ordering::Relaxed) {
        if safety.is_halted() {
            log::error!("Actuator halted, shutting down");
            running.store(false, Ordering::Relaxed);
            break;
        }
        if last_status.elapsed() >= STATUS_INTERVAL {
            let stats = safety.stats();
            log::info!(
                "Status: state={} accepted={} rejected={} completions={} obstacle_stops={}",
                safety.state().as_str(),
                stats.accepted,
                stats.rejected,
                stats.completions,
                stats.obstacle_stops
            );
            last_status = Instant::now();
        }
        thread::sleep(MAIN_POLL);
    }

    log::info!("Shutting down...");
    if let Err(e) = safety.force_stop() {
        log::error!("Final stop failed: {}", e);
    }

    // Server drop tears down any live session and joins its threads
    drop(server);
    if scan_producer.join().is_err() {
        log::warn!("Scan producer panicked");
    }
    if proximity_producer.join().is_err() {
        log::warn!("Proximity producer panicked");
    }

    log::info!("YantraIO stopped");
    Ok(())
}
