//! Mock actuator backend for hardware-free testing

use crate::core::actuators::Actuators;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Number of button LEDs on the robot
pub const NUM_BUTTON_LEDS: u8 = 4;

/// Recorded calls kept before the oldest are dropped
pub const CALL_HISTORY: usize = 256;

/// One recorded actuator call
#[derive(Debug, Clone, PartialEq)]
pub enum ActuatorCall {
    Forward(f64),
    Backward(f64),
    TurnLeft(f64),
    TurnRight(f64),
    SetMotorSpeeds(f64, f64),
    Stop,
    Coast,
    SetButtonLed(u8, f64),
    FillUnderlighting(u8, u8, u8),
    ReadDistance,
}

#[derive(Debug)]
struct MockRobotState {
    calls: VecDeque<ActuatorCall>,
    distance_cm: f64,
    faulted: bool,
}

/// Mock robot that logs and records every actuator call
///
/// Clones share state, so a test can keep a clone as an inspection
/// handle after boxing the robot for the server.
#[derive(Debug, Clone)]
pub struct MockRobot {
    state: Arc<Mutex<MockRobotState>>,
}

impl MockRobot {
    /// Create a mock robot whose distance sensor reads `distance_cm`
    pub fn new(distance_cm: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockRobotState {
                calls: VecDeque::with_capacity(CALL_HISTORY),
                distance_cm,
                faulted: false,
            })),
        }
    }

    /// Recent calls, oldest first; at most [`CALL_HISTORY`]
    pub fn calls(&self) -> Vec<ActuatorCall> {
        self.state.lock().calls.iter().cloned().collect()
    }

    /// Most recent call
    pub fn last_call(&self) -> Option<ActuatorCall> {
        self.state.lock().calls.back().cloned()
    }

    /// Make every subsequent call fail with a hardware error
    pub fn set_faulted(&self, faulted: bool) {
        self.state.lock().faulted = faulted;
    }

    fn record(&self, call: ActuatorCall) -> Result<()> {
        let mut state = self.state.lock();
        if state.faulted {
            return Err(Error::Other(format!("mock actuator fault during {:?}", call)));
        }
        log::debug!("MOCK: {:?}", call);
        if state.calls.len() == CALL_HISTORY {
            state.calls.pop_front();
        }
        state.calls.push_back(call);
        Ok(())
    }
}

impl Default for MockRobot {
    fn default() -> Self {
        Self::new(99.9)
    }
}

impl Actuators for MockRobot {
    fn forward(&mut self, speed: f64) -> Result<()> {
        self.record(ActuatorCall::Forward(speed))
    }

    fn backward(&mut self, speed: f64) -> Result<()> {
        self.record(ActuatorCall::Backward(speed))
    }

    fn turn_left(&mut self, speed: f64) -> Result<()> {
        self.record(ActuatorCall::TurnLeft(speed))
    }

    fn turn_right(&mut self, speed: f64) -> Result<()> {
        self.record(ActuatorCall::TurnRight(speed))
    }

    fn set_motor_speeds(&mut self, left: f64, right: f64) -> Result<()> {
        self.record(ActuatorCall::SetMotorSpeeds(left, right))
    }

    fn stop(&mut self) -> Result<()> {
        self.record(ActuatorCall::Stop)
    }

    fn coast(&mut self) -> Result<()> {
        self.record(ActuatorCall::Coast)
    }

    fn set_button_led(&mut self, led: u8, value: f64) -> Result<()> {
        if led >= NUM_BUTTON_LEDS {
            return Err(Error::InvalidParameter(format!(
                "button LED {} out of range 0-{}",
                led,
                NUM_BUTTON_LEDS - 1
            )));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(Error::InvalidParameter(format!(
                "LED brightness {} outside 0.0-1.0",
                value
            )));
        }
        self.record(ActuatorCall::SetButtonLed(led, value))
    }

    fn fill_underlighting(&mut self, r: u8, g: u8, b: u8) -> Result<()> {
        self.record(ActuatorCall::FillUnderlighting(r, g, b))
    }

    fn read_distance(&mut self) -> Result<f64> {
        self.record(ActuatorCall::ReadDistance)?;
        Ok(self.state.lock().distance_cm)
    }
}
