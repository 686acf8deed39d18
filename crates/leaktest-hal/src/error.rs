//! Capability error types.

use thiserror::Error;

/// Errors raised by a valve actuator backend.
#[derive(Error, Debug)]
pub enum ActuatorError {
    /// Communication with the solenoid driver failed.
    #[error("actuator communication failed: {0}")]
    Communication(String),

    /// Chamber index outside the rig.
    #[error("no valve driver for chamber {0}")]
    NoSuchChamber(usize),
}

impl ActuatorError {
    pub fn communication(msg: impl Into<String>) -> Self {
        ActuatorError::Communication(msg.into())
    }
}

/// Errors raised by a pressure source backend or by the sampling layer.
#[derive(Error, Debug)]
pub enum SensorError {
    /// A single acquisition failed; the read may be retried.
    #[error("pressure read failed: {0}")]
    ReadFailed(String),

    /// Too many consecutive failed acquisitions; the sensor is considered
    /// dead for the remainder of the run.
    #[error("sensor fault after {consecutive} consecutive failed reads")]
    Fault { consecutive: u32 },
}

impl SensorError {
    pub fn read_failed(msg: impl Into<String>) -> Self {
        SensorError::ReadFailed(msg.into())
    }

    /// True when the sampling layer has given up on the sensor.
    pub fn is_fault(&self) -> bool {
        matches!(self, SensorError::Fault { .. })
    }
}
