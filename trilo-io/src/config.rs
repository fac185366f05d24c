//! Configuration for the TriloIO daemon
//!
//! Loaded from a TOML file. Every field has a default, so an empty file (or no
//! file at all) yields a working mock setup on ports 9000/9001.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level daemon configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Command and video channel settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// Interface the command listener binds to
    ///
    /// Examples:
    /// - `0.0.0.0` - all interfaces
    /// - `127.0.0.1` - localhost only
    #[serde(default = "default_bind_host")]
    pub bind_host: String,

    /// TCP port for the line-delimited command channel (default: 9000)
    #[serde(default = "default_command_port")]
    pub command_port: u16,

    /// UDP port on the *client* that video frames are sent to (default: 9001)
    #[serde(default = "default_video_port")]
    pub video_port: u16,
}

/// Camera capture settings used by the frame producer
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CameraConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Frames per second
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    /// JPEG quality, 1-100
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

/// Actuator backend selection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// Device type (only "mock" is built in)
    #[serde(default = "default_device_type")]
    pub device_type: String,

    /// Distance reported by the mock sensor, in centimetres
    #[serde(default = "default_mock_distance")]
    pub mock_distance_cm: f64,
}

/// Grace periods for the shutdown protocol
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShutdownConfig {
    /// Bound on joining the accept loop and the active session
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,

    /// Bound on joining the video sender loop
    #[serde(default = "default_relay_join_timeout_ms")]
    pub relay_join_timeout_ms: u64,

    /// Connect timeout of the self-connection that wakes a blocked accept
    #[serde(default = "default_wake_timeout_ms")]
    pub wake_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error); RUST_LOG overrides
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

fn default_command_port() -> u16 {
    9000
}

fn default_video_port() -> u16 {
    9001
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

fn default_frame_rate() -> u32 {
    24
}

fn default_jpeg_quality() -> u8 {
    85
}

fn default_device_type() -> String {
    "mock".to_string()
}

fn default_mock_distance() -> f64 {
    99.9
}

fn default_join_timeout_ms() -> u64 {
    2000
}

fn default_relay_join_timeout_ms() -> u64 {
    5000
}

fn default_wake_timeout_ms() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_host: default_bind_host(),
            command_port: default_command_port(),
            video_port: default_video_port(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            frame_rate: default_frame_rate(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_type: default_device_type(),
            mock_distance_cm: default_mock_distance(),
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            join_timeout_ms: default_join_timeout_ms(),
            relay_join_timeout_ms: default_relay_join_timeout_ms(),
            wake_timeout_ms: default_wake_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ShutdownConfig {
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn relay_join_timeout(&self) -> Duration {
        Duration::from_millis(self.relay_join_timeout_ms)
    }

    pub fn wake_timeout(&self) -> Duration {
        Duration::from_millis(self.wake_timeout_ms)
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use trilo_io::config::Config;
    ///
    /// let config = Config::load("trilo.toml")?;
    /// # Ok::<(), trilo_io::Error>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.network.bind_host.trim().is_empty() {
            return Err(Error::Config("network.bind_host must not be empty".into()));
        }
        if self.network.video_port == 0 {
            return Err(Error::Config("network.video_port must be positive".into()));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(Error::Config(format!(
                "camera resolution {}x{} is invalid",
                self.camera.width, self.camera.height
            )));
        }
        if self.camera.frame_rate == 0 {
            return Err(Error::Config("camera.frame_rate must be positive".into()));
        }
        if !(1..=100).contains(&self.camera.jpeg_quality) {
            return Err(Error::Config(format!(
                "camera.jpeg_quality {} outside 1-100",
                self.camera.jpeg_quality
            )));
        }
        Ok(())
    }

    /// Address string for the command listener
    pub fn command_bind_address(&self) -> String {
        format!("{}:{}", self.network.bind_host, self.network.command_port)
    }
}
