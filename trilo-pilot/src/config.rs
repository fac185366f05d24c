//! Configuration loading for TriloPilot

use crate::error::{PilotError, Result};
use serde::Deserialize;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

/// Controller link settings
#[derive(Clone, Debug, Deserialize)]
pub struct PilotConfig {
    /// Robot IP address or hostname (default: 127.0.0.1 for a local daemon)
    #[serde(default = "default_robot_host")]
    pub robot_host: String,

    /// TCP command port on the robot (default: 9000)
    #[serde(default = "default_command_port")]
    pub command_port: u16,

    /// Local UDP port video arrives on (default: 9001)
    #[serde(default = "default_video_port")]
    pub video_port: u16,

    /// Interface the video socket binds to (default: all)
    #[serde(default = "default_video_bind_host")]
    pub video_bind_host: String,

    /// Command connection timeout in milliseconds (default: 5000)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Video receive timeout in milliseconds; bounds how long the receiver
    /// goes without rechecking whether it should stop (default: 1000)
    #[serde(default = "default_video_recv_timeout")]
    pub video_recv_timeout_ms: u64,

    /// Bound on joining each receiver thread on disconnect (default: 1000)
    #[serde(default = "default_join_timeout")]
    pub join_timeout_ms: u64,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            robot_host: default_robot_host(),
            command_port: default_command_port(),
            video_port: default_video_port(),
            video_bind_host: default_video_bind_host(),
            connect_timeout_ms: default_connect_timeout(),
            video_recv_timeout_ms: default_video_recv_timeout(),
            join_timeout_ms: default_join_timeout(),
        }
    }
}

// Default value functions
fn default_robot_host() -> String {
    "127.0.0.1".to_string()
}
fn default_command_port() -> u16 {
    9000
}
fn default_video_port() -> u16 {
    9001
}
fn default_video_bind_host() -> String {
    "0.0.0.0".to_string()
}
fn default_connect_timeout() -> u64 {
    5000
}
fn default_video_recv_timeout() -> u64 {
    1000
}
fn default_join_timeout() -> u64 {
    1000
}

impl PilotConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PilotError::Config(format!("Failed to read {:?}: {}", path, e)))?;
        let config: PilotConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.command_port == 0 {
            return Err(PilotError::Config("command_port must be positive".into()));
        }
        if self.video_bind_host.trim().is_empty() {
            return Err(PilotError::Config("video_bind_host must not be empty".into()));
        }
        if self.connect_timeout_ms == 0 || self.video_recv_timeout_ms == 0 {
            return Err(PilotError::Config("timeouts must be positive".into()));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn video_recv_timeout(&self) -> Duration {
        Duration::from_millis(self.video_recv_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    /// Local address the video socket binds to
    pub fn video_bind_address(&self) -> String {
        format!("{}:{}", self.video_bind_host, self.video_port)
    }

    /// Resolve `host` to the robot's command address
    pub fn command_address(&self, host: &str) -> Result<SocketAddr> {
        let host = host.trim();
        if host.is_empty() {
            return Err(PilotError::Config("robot host must not be empty".into()));
        }
        (host, self.command_port)
            .to_socket_addrs()
            .map_err(|e| PilotError::Config(format!("Invalid robot address {}: {}", host, e)))?
            .next()
            .ok_or_else(|| PilotError::Config(format!("No address found for {}", host)))
    }
}
