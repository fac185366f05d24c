//! Actuators trait definition

use crate::error::Result;
use parking_lot::Mutex;
use std::sync::Arc;

/// Actuator handle shared between the daemon and the active session
pub type SharedActuators = Arc<Mutex<Box<dyn Actuators>>>;

/// Robot capability interface called by the command dispatcher
///
/// Speeds are passed through as received. Implementations that cannot honour
/// a value should return [`Error::InvalidParameter`](crate::Error::InvalidParameter),
/// which the session logs without disconnecting; any other error ends the
/// session.
pub trait Actuators: Send {
    fn forward(&mut self, speed: f64) -> Result<()>;

    fn backward(&mut self, speed: f64) -> Result<()>;

    fn turn_left(&mut self, speed: f64) -> Result<()>;

    fn turn_right(&mut self, speed: f64) -> Result<()>;

    /// Set left and right motor speeds independently
    fn set_motor_speeds(&mut self, left: f64, right: f64) -> Result<()>;

    /// Brake both motors
    fn stop(&mut self) -> Result<()>;

    /// Let both motors spin down freely
    fn coast(&mut self) -> Result<()>;

    /// Set the brightness (0.0-1.0) of a numbered button LED
    fn set_button_led(&mut self, led: u8, value: f64) -> Result<()>;

    /// Set every underlighting LED to one colour
    fn fill_underlighting(&mut self, r: u8, g: u8, b: u8) -> Result<()>;

    /// Distance to the nearest obstacle, in centimetres
    fn read_distance(&mut self) -> Result<f64>;
}

/// Wrap an actuator implementation for sharing
pub fn shared(actuators: Box<dyn Actuators>) -> SharedActuators {
    Arc::new(Mutex::new(actuators))
}
