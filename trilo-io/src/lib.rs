//! TriloIO - command server for a small tracked robot
//!
//! This library provides the robot-side pieces: the single-session TCP
//! command server, the UDP video relay and the actuator seam it drives.
//!
//! ## Channels
//!
//! - **TCP (port 9000)**: line-delimited JSON commands and replies
//! - **UDP (client port 9001)**: latest camera frame, one JPEG per datagram
//!
//! The client that holds the command session is the one video is sent to.

pub mod config;
pub mod core;
pub mod devices;
pub mod error;
pub mod streaming;
pub mod threads;

// Re-export commonly used types
pub use config::Config;
pub use crate::core::actuators::{Actuators, SharedActuators};
pub use error::{Error, Result};
pub use streaming::{Command, CommandServer, FrameBuffer, Reply, ServerConfig};
