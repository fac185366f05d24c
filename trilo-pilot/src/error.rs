//! Error types for TriloPilot

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// TriloPilot error type
#[derive(Error, Debug)]
pub enum PilotError {
    #[error("Connection to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: SocketAddr, timeout: Duration },

    #[error("Connection refused by {0}; is the command server running?")]
    ConnectionRefused(SocketAddr),

    #[error("Connection failed: {0}")]
    Connection(#[source] std::io::Error),

    #[error("Failed to bind video socket {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Not connected to a robot")]
    NotConnected,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for PilotError {
    fn from(e: toml::de::Error) -> Self {
        PilotError::Config(e.to_string())
    }
}

impl From<trilo_io::Error> for PilotError {
    fn from(e: trilo_io::Error) -> Self {
        match e {
            trilo_io::Error::Io(e) => PilotError::Io(e),
            trilo_io::Error::Config(msg) => PilotError::Config(msg),
            trilo_io::Error::ThreadSpawn(msg) => PilotError::Io(std::io::Error::other(msg)),
            other => PilotError::Protocol(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, PilotError>;
