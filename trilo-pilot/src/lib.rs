//! TriloPilot - controller side of the TriloIO robot link
//!
//! Connects to a TriloIO daemon, sends drive commands over TCP, and keeps
//! the latest camera frame received over UDP.

pub mod config;
pub mod error;
pub mod keymap;
pub mod link;
pub mod receivers;

pub use config::PilotConfig;
pub use error::{PilotError, Result};
pub use link::{LinkEvent, RobotLink};
