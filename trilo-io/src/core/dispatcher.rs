//! Command dispatcher
//!
//! Maps each decoded [`Command`] onto the [`Actuators`](super::actuators::Actuators)
//! capability and decides what the session does next.
//!
//! | Command | Actuator call | Outcome |
//! |---------|---------------|---------|
//! | `Forward`/`Backward`/`TurnLeft`/`TurnRight` | matching motion call | continue |
//! | `SetSpeeds` | `set_motor_speeds` | continue |
//! | `Stop` / `Coast` | `stop` / `coast` | continue |
//! | `SetLed` | `set_button_led` | continue |
//! | `FillUnderlighting` | `fill_underlighting` | continue |
//! | `ReadDistance` | `read_distance` | reply with distance |
//! | `Ping` | - | reply `pong` |
//! | `Exit` | - | terminate |
//! | `Unrecognized` | - | logged, continue |

use crate::core::actuators::SharedActuators;
use crate::error::{Error, Result};
use crate::streaming::messages::{Command, Reply};

/// What the session should do after a command
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Keep reading
    Continue,
    /// Write this reply, then keep reading
    Reply(Reply),
    /// End the session
    Terminate,
}

/// Executes commands against the shared actuators
pub struct CommandDispatcher {
    actuators: SharedActuators,
}

impl CommandDispatcher {
    pub fn new(actuators: SharedActuators) -> Self {
        Self { actuators }
    }

    /// Execute one command.
    ///
    /// Values rejected by the actuators ([`Error::InvalidParameter`]) are
    /// logged and the session continues. Any other actuator error is
    /// returned and ends the session.
    pub fn dispatch(&self, command: Command) -> Result<Dispatch> {
        log::debug!("Executing command: {:?}", command);

        match self.execute(&command) {
            Ok(outcome) => Ok(outcome),
            Err(Error::InvalidParameter(reason)) => {
                log::error!("Error processing command {}: {}", command.action(), reason);
                Ok(Dispatch::Continue)
            }
            Err(e) => {
                log::error!("Command {} failed: {}", command.action(), e);
                Err(e)
            }
        }
    }

    fn execute(&self, command: &Command) -> Result<Dispatch> {
        let mut actuators = self.actuators.lock();
        match *command {
            Command::Forward { speed } => actuators.forward(speed)?,
            Command::Backward { speed } => actuators.backward(speed)?,
            Command::TurnLeft { speed } => actuators.turn_left(speed)?,
            Command::TurnRight { speed } => actuators.turn_right(speed)?,
            Command::SetSpeeds { left, right } => actuators.set_motor_speeds(left, right)?,
            Command::Stop => actuators.stop()?,
            Command::Coast => actuators.coast()?,
            Command::SetLed { led, value } => actuators.set_button_led(led, value)?,
            Command::FillUnderlighting { r, g, b } => actuators.fill_underlighting(r, g, b)?,
            Command::ReadDistance => {
                let distance = actuators.read_distance()?;
                return Ok(Dispatch::Reply(Reply::distance(distance)));
            }
            Command::Ping => return Ok(Dispatch::Reply(Reply::pong())),
            Command::Exit => {
                log::info!("Client requested exit.");
                return Ok(Dispatch::Terminate);
            }
            Command::Unrecognized { ref action } => {
                log::warn!("Unknown action received: {}", action);
            }
        }
        Ok(Dispatch::Continue)
    }
}
