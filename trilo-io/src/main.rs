//! TriloIO - command server daemon for a small tracked robot
//!
//! ## Protocol Architecture
//!
//! - **TCP (port 9000)**: line-delimited JSON commands, one client at a time
//! - **UDP (client port 9001)**: camera frames to the connected client
//!
//! When a TCP client is admitted, its IP becomes the video target for the
//! life of the session.

use std::env;
use std::sync::Arc;
use trilo_io::config::Config;
use trilo_io::core::actuators::shared;
use trilo_io::devices::create_device;
use trilo_io::devices::mock::TestPatternCamera;
use trilo_io::error::{Error, Result};
use trilo_io::streaming::{CommandServer, FrameBuffer, ServerConfig};

/// Parse config path from command line arguments.
///
/// Supports:
/// - `trilo-io <path>` (positional)
/// - `trilo-io --config <path>` (flag-based)
/// - `trilo-io -c <path>` (short flag)
///
/// Returns `None` when no path is given; built-in defaults are used then.
fn parse_config_path() -> Option<String> {
    let args: Vec<String> = env::args().collect();

    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return Some(args[1].clone());
    }

    None
}

fn main() -> Result<()> {
    let config = match parse_config_path() {
        Some(path) => Some((Config::load(&path)?, path)),
        None => None,
    };

    let filter = config
        .as_ref()
        .map(|(c, _)| c.logging.level.clone())
        .unwrap_or_else(|| "info".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    log::info!("TriloIO v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = match config {
        Some((config, path)) => {
            log::info!("Using config: {}", path);
            config
        }
        None => {
            log::info!("No config given, using defaults");
            Config::default()
        }
    };
    config.validate()?;
    if config.network.command_port == 0 {
        return Err(Error::Config("network.command_port must be positive".into()));
    }

    log::info!("Device: {}", config.device.device_type);
    let actuators = shared(create_device(&config)?);

    let frames = Arc::new(FrameBuffer::new());
    let camera = TestPatternCamera::new(config.camera.clone(), Arc::clone(&frames));
    camera.start()?;

    let server = CommandServer::new(
        ServerConfig::from_config(&config),
        Arc::clone(&actuators),
        Arc::clone(&frames),
    )?;
    server.start()?;

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        let _ = shutdown_tx.try_send(());
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    log::info!(
        "TriloIO running (video -> client:{}). Press Ctrl-C to stop.",
        config.network.video_port
    );
    let _ = shutdown_rx.recv();

    log::info!("Shutting down...");
    server.stop();
    camera.stop();
    if let Err(e) = actuators.lock().stop() {
        log::error!("Failed to stop motors: {}", e);
    }

    log::info!("TriloIO stopped");
    Ok(())
}
