//! Device implementations

pub mod mock;

use crate::config::Config;
use crate::core::actuators::Actuators;
use crate::error::{Error, Result};
use mock::MockRobot;

/// Create an actuator backend based on configuration
pub fn create_device(config: &Config) -> Result<Box<dyn Actuators>> {
    match config.device.device_type.as_str() {
        "mock" => {
            let robot = MockRobot::new(config.device.mock_distance_cm);
            Ok(Box::new(robot))
        }
        _ => Err(Error::UnknownDevice(config.device.device_type.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_mock_device() {
        let mut config = Config::default();
        config.device.mock_distance_cm = 5.0;
        let mut device = create_device(&config).unwrap();
        assert_eq!(device.read_distance().unwrap(), 5.0);
    }

    #[test]
    fn test_unknown_device() {
        let mut config = Config::default();
        config.device.device_type = "crl200s".to_string();
        assert!(matches!(
            create_device(&config),
            Err(Error::UnknownDevice(name)) if name == "crl200s"
        ));
    }
}
