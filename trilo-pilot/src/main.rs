//! TriloPilot - interactive driver for a TriloIO robot
//!
//! Reads one key per line from stdin and sends the matching command.
//! Replies from the robot are printed as they arrive.

use crossbeam_channel::{bounded, select, unbounded};
use std::io::BufRead;
use std::path::Path;
use trilo_io::streaming::Command;
use trilo_pilot::PilotConfig;
use trilo_pilot::error::{PilotError, Result};
use trilo_pilot::keymap::{Debouncer, KeyAction, action_for_input};
use trilo_pilot::link::{LinkEvent, RobotLink};

/// Where `c` saves the latest frame
const FRAME_PATH: &str = "frame.jpg";

/// Config file picked up from the working directory when none is given
const DEFAULT_CONFIG_PATH: &str = "trilo-pilot.toml";

fn load_config() -> Result<PilotConfig> {
    let args: Vec<String> = std::env::args().collect();

    let explicit = args
        .iter()
        .position(|a| a == "-c" || a == "--config")
        .and_then(|i| args.get(i + 1))
        .or_else(|| args.get(1).filter(|a| !a.starts_with('-')));

    let mut config = if let Some(path) = explicit {
        let config_path = Path::new(path);
        log::info!("Loading configuration from {:?}", config_path);
        PilotConfig::load(config_path)?
    } else if Path::new(DEFAULT_CONFIG_PATH).exists() {
        log::info!("Loading configuration from {}", DEFAULT_CONFIG_PATH);
        PilotConfig::load(Path::new(DEFAULT_CONFIG_PATH))?
    } else {
        log::info!("Using default configuration");
        PilotConfig::default()
    };

    // Override robot host if provided
    if let Some(host) = args
        .iter()
        .position(|a| a == "--robot")
        .and_then(|i| args.get(i + 1))
    {
        log::info!("Using robot host: {}", host);
        config.robot_host = host.clone();
    }

    Ok(config)
}

fn print_help() {
    println!();
    println!("--- Interactive Control ---");
    println!("  w: Forward    s: Backward");
    println!("  a: Left       d: Right");
    println!("  x: Stop       (empty line or unassigned key also stops)");
    println!("  p: Ping       l: Underlighting on");
    println!("  c: Save frame to {}", FRAME_PATH);
    println!("  q: Quit");
    println!("---------------------------");
}

fn save_frame(link: &RobotLink) {
    let Some(frame) = link.latest_frame() else {
        println!("No video frame received yet");
        return;
    };
    match std::fs::write(FRAME_PATH, &frame[..]) {
        Ok(()) => {
            let size = link
                .latest_image()
                .map(|image| format!("{}x{}", image.width(), image.height()))
                .unwrap_or_else(|| "undecodable".to_string());
            println!("Saved {} byte frame ({}) to {}", frame.len(), size, FRAME_PATH);
        }
        Err(e) => log::error!("Failed to save frame to {}: {}", FRAME_PATH, e),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = load_config()?;
    let link = RobotLink::new(config.clone());
    link.connect(&config.robot_host)?;
    if let (Some(robot), Some(video)) = (link.robot_addr(), link.video_addr()) {
        println!("Connected to {} (video on {})", robot, video);
    }

    let (quit_tx, quit_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = quit_tx.try_send(());
    })
    .map_err(|e| PilotError::Config(format!("Error setting Ctrl-C handler: {}", e)))?;

    // Detached: a blocking stdin read cannot be cancelled
    let (input_tx, input_rx) = unbounded::<String>();
    std::thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if input_tx.send(line).is_err() {
                    break;
                }
            }
        })?;

    print_help();
    let events = link.events();
    let mut debouncer = Debouncer::new();

    loop {
        select! {
            recv(input_rx) -> line => {
                let Ok(line) = line else { break };
                match action_for_input(&line) {
                    KeyAction::Quit => break,
                    KeyAction::SaveFrame => save_frame(&link),
                    KeyAction::Send(command) => {
                        if debouncer.should_send(&command)
                            && let Err(e) = link.send(&command)
                        {
                            log::error!("Failed to send {}: {}", command.action(), e);
                        }
                    }
                }
            }
            recv(events) -> event => match event {
                Ok(LinkEvent::Reply { line, .. }) => println!("< {}", line),
                Ok(LinkEvent::Disconnected) | Err(_) => {
                    log::warn!("Link to robot lost");
                    break;
                }
            },
            recv(quit_rx) -> _ => {
                log::info!("Received shutdown signal");
                break;
            }
        }
    }

    println!("Shutting down client...");
    if link.is_connected() {
        // Make sure the robot stops before the session ends
        if let Err(e) = link.send(&Command::Stop) {
            log::warn!("Failed to send final stop: {}", e);
        }
        link.disconnect();
    }
    println!("Client finished.");
    Ok(())
}
