//! DrishtiMap - occupancy mapping daemon for the controller node
//!
//! Connects to the YantraIO actuator daemon, folds its scan telemetry into
//! a log-odds occupancy grid, and keeps the latest map snapshot in shared
//! state for renderers and status reporting.
//!
//! ## Thread layout
//!
//! - **main**: wiring, then an interval status loop over shared state
//! - **mapper**: session client, scan integration, periodic map saves
//!
//! # Usage
//!
//! ```bash
//! # With default config
//! cargo run --release
//!
//! # With custom config file
//! cargo run --release -- --config drishti-map.toml
//! ```

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;

use setu_link::now_micros;

use drishti_map::mapping::{GridConfig, MapperConfig, Pose};
use drishti_map::state::{create_shared_state, SharedStateHandle};
use drishti_map::threads::{MapperThread, MapperThreadConfig};

/// Interval between status lines in the log
const STATUS_INTERVAL: Duration = Duration::from_secs(30);

/// Main loop poll interval
const MAIN_POLL: Duration = Duration::from_millis(200);

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Deserialize, Default)]
struct Config {
    #[serde(default)]
    source: SourceConfig,
    #[serde(default)]
    mapper: MapperSection,
    #[serde(default)]
    grid: GridSection,
    #[serde(default)]
    map_storage: MapStorageConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SourceConfig {
    /// YantraIO address for the telemetry session.
    /// Format: "host:port" (e.g., "192.168.68.90:5560").
    actuator_address: String,
    /// Node name reported in the handshake.
    node_name: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            actuator_address: "192.168.68.90:5560".to_string(),
            node_name: "drishti-map".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct MapperSection {
    /// Minimum valid range in meters; shorter returns are discarded.
    min_range: f64,
    /// Maximum valid range in meters; longer returns are discarded.
    max_range: f64,
}

impl Default for MapperSection {
    fn default() -> Self {
        Self {
            min_range: 0.15,
            max_range: 12.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct GridSection {
    width: usize,
    height: usize,
    resolution: f64,
    log_odds_occupied: f32,
    log_odds_free: f32,
    log_odds_max: f32,
    log_odds_min: f32,
    occupied_threshold: f32,
    free_threshold: f32,
}

impl Default for GridSection {
    fn default() -> Self {
        Self {
            width: 400, // 20m at 5cm cells
            height: 400,
            resolution: 0.05,
            log_odds_occupied: 0.9,
            log_odds_free: -0.7,
            log_odds_max: 50.0,
            log_odds_min: -50.0,
            occupied_threshold: 0.5,
            free_threshold: -0.5,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct MapStorageConfig {
    /// Map file path; empty disables saving.
    path: String,
    /// Seconds between periodic saves; 0 saves only on shutdown.
    save_interval_s: u64,
}

impl Default for MapStorageConfig {
    fn default() -> Self {
        Self {
            path: "/var/lib/drishti/drishti.map".to_string(),
            save_interval_s: 60,
        }
    }
}

// ============================================================================
// CLI Arguments
// ============================================================================

struct Args {
    config_path: Option<String>,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut result = Args { config_path: None };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    result.config_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg if !arg.starts_with('-') && result.config_path.is_none() => {
                result.config_path = Some(arg.to_string());
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    result
}

fn print_help() {
    println!("drishti-map - occupancy mapping daemon for the controller node");
    println!();
    println!("USAGE:");
    println!("    drishti-map [OPTIONS] [CONFIG]");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <FILE>     Configuration file (default: drishti-map.toml)");
    println!("    -h, --help              Print help information");
    println!();
    println!("CONFIGURATION:");
    println!("    All settings are configured via the TOML config file:");
    println!("    - [source] actuator_address: YantraIO daemon address");
    println!("    - [grid] width, height, resolution: map geometry");
    println!("    - [map_storage] path: periodic map save location");
}

fn load_config(args: &Args) -> Config {
    match &args.config_path {
        Some(path) => match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(cfg) => {
                    log::info!("Loaded config from {}", path);
                    cfg
                }
                Err(e) => {
                    log::warn!("Failed to parse config {}: {}", path, e);
                    Config::default()
                }
            },
            Err(e) => {
                log::warn!("Failed to read config {}: {}", path, e);
                Config::default()
            }
        },
        None => {
            // Try default paths
            for path in &["drishti-map.toml", "/etc/drishti-map.toml"] {
                if let Ok(contents) = fs::read_to_string(path) {
                    if let Ok(cfg) = toml::from_str(&contents) {
                        log::info!("Loaded config from {}", path);
                        return cfg;
                    }
                }
            }
            Config::default()
        }
    }
}

/// Build the mapper configuration from the TOML sections.
///
/// The origin pose sits at the grid center, facing +x.
fn build_mapper_config(config: &Config) -> MapperConfig {
    let grid = GridConfig {
        width: config.grid.width,
        height: config.grid.height,
        resolution: config.grid.resolution,
        log_odds_occupied: config.grid.log_odds_occupied,
        log_odds_free: config.grid.log_odds_free,
        log_odds_max: config.grid.log_odds_max,
        log_odds_min: config.grid.log_odds_min,
        occupied_threshold: config.grid.occupied_threshold,
        free_threshold: config.grid.free_threshold,
    };
    let origin = Pose::new(grid.width as f64 / 2.0, grid.height as f64 / 2.0, 0.0);

    MapperConfig {
        range_min_m: config.mapper.min_range,
        range_max_m: config.mapper.max_range,
        origin,
        grid,
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {} - {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let args = parse_args();
    let config = load_config(&args);

    log::info!("drishti-map starting");
    log::info!("  Actuator: {}", config.source.actuator_address);
    log::info!(
        "  Grid: {}x{} cells at {}m/cell",
        config.grid.width,
        config.grid.height,
        config.grid.resolution
    );
    if config.map_storage.path.is_empty() {
        log::info!("  Map storage: disabled");
    } else {
        log::info!(
            "  Map storage: {} (every {}s)",
            config.map_storage.path,
            config.map_storage.save_interval_s
        );
    }

    // Setup signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .expect("Error setting Ctrl-C handler");

    let shared_state = create_shared_state();

    let save_path = if config.map_storage.path.is_empty() {
        None
    } else {
        Some(PathBuf::from(&config.map_storage.path))
    };
    let thread_config = MapperThreadConfig {
        actuator_address: config.source.actuator_address.clone(),
        node_name: config.source.node_name.clone(),
        mapper: build_mapper_config(&config),
        save_path,
        save_interval_s: config.map_storage.save_interval_s,
    };

    let mapper_thread =
        MapperThread::spawn(thread_config, shared_state.clone(), running.clone());

    log::info!("drishti-map running. Press Ctrl-C to stop.");

    // Interval status over shared state
    let mut last_status = Instant::now();
    while running.load(Ordering::Relaxed) {
        if last_status.elapsed() >= STATUS_INTERVAL {
            log_status(&shared_state);
            last_status = Instant::now();
        }
        thread::sleep(MAIN_POLL);
    }

    log::info!("Shutting down...");
    if mapper_thread.join().is_err() {
        log::error!("Mapper thread panicked");
    }

    log::info!("drishti-map stopped");
}

fn log_status(shared_state: &SharedStateHandle) {
    if let Ok(state) = shared_state.read() {
        let link = if state.link.connected {
            match state.link.telemetry_age_s(now_micros()) {
                Some(age) => format!("up, telemetry {:.1}s ago", age),
                None => "up, no telemetry yet".to_string(),
            }
        } else {
            "down".to_string()
        };

        let stats = state.mapper_stats;
        match &state.map {
            Some(map) => {
                let (free, unknown, occupied) = map.count_cells();
                log::info!(
                    "Status: link={} batches={} dropped={} free={} unknown={} occupied={}",
                    link,
                    stats.batches_integrated,
                    stats.batches_dropped,
                    free,
                    unknown,
                    occupied
                );
            }
            None => log::info!("Status: link={} no map yet", link),
        }
    }
}
