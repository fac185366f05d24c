//! Error types for TriloIO

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// TriloIO error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or unusable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Encoding a reply or frame failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Actuator rejected a parameter value
    ///
    /// Recoverable: the session logs it and keeps reading.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Unknown device type in config
    #[error("Unknown device type: {0}")]
    UnknownDevice(String),

    /// Thread could not be spawned
    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
