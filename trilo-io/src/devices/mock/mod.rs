//! Mock devices for hardware-free runs
//!
//! | Component | Simulation |
//! |-----------|------------|
//! | Motors, LEDs, underlighting | Logged and recorded by [`MockRobot`] |
//! | Distance sensor | Fixed configurable reading |
//! | Camera | Scrolling colour bars, JPEG encoded by [`TestPatternCamera`] |
//!
//! Example configuration:
//!
//! ```toml
//! [device]
//! device_type = "mock"
//! mock_distance_cm = 42.0
//!
//! [camera]
//! width = 320
//! height = 240
//! frame_rate = 15
//! ```

mod camera;
mod robot;

pub use camera::{TestPatternCamera, encode_test_frame};
pub use robot::{ActuatorCall, MockRobot, NUM_BUTTON_LEDS};
