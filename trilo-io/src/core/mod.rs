//! Core abstractions for the command path.
//!
//! - [`actuators::Actuators`]: Trait to implement for new hardware
//! - [`dispatcher::CommandDispatcher`]: Turns decoded commands into actuator calls and replies

pub mod actuators;
pub mod dispatcher;
