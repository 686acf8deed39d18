//! Error types for the test engine.

use thiserror::Error;

use leaktest_hal::{ActuatorError, SensorError};

/// Errors that reject a run before any phase begins.
#[derive(Error, Debug)]
pub enum StartError {
    /// Another run is active on this engine.
    #[error("a test run is already active")]
    AlreadyRunning,

    /// The configuration enables no chambers.
    #[error("no chambers enabled for testing")]
    NoChambersEnabled,

    /// A configuration field violates its invariant.
    #[error("invalid test configuration: {0}")]
    ConfigInvalid(String),

    /// The pre-run valve drive or pressure probe failed.
    #[error("hardware self-check failed: {0}")]
    HardwareSelfCheckFailed(String),
}

impl StartError {
    pub fn config_invalid(msg: impl Into<String>) -> Self {
        StartError::ConfigInvalid(msg.into())
    }
}

/// Fatal faults that terminate a running test.
///
/// Every one of these routes the state machine through Emptying into Error;
/// non-fatal conditions (regulation timeout, stability timeout, isolated
/// actuator glitches, transient sensor reads) are logged and absorbed
/// without surfacing here.
#[derive(Error, Debug)]
pub enum RunError {
    /// A chamber could not reach its target within the fill deadline.
    #[error("fill timeout exceeded ({0} s)")]
    FillTimeout(u64),

    /// The sampling layer declared the sensor dead.
    #[error(transparent)]
    Sensor(#[from] SensorError),

    /// Repeated actuator failures for one chamber within a single phase.
    #[error("actuator fault on chamber {chamber}: {source}")]
    Actuator {
        chamber: usize,
        source: ActuatorError,
    },

    /// Valves could not be secured while winding the run down.
    #[error("failed to close valves during shutdown: {0}")]
    Shutdown(ActuatorError),
}

/// Errors raised by a result store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend rejected the record.
    #[error("result store rejected record: {0}")]
    Rejected(String),

    /// The backend could not be reached.
    #[error("result store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        StoreError::Unavailable(msg.into())
    }
}

/// Errors raised by a printer backend. Always non-fatal to the run.
#[derive(Error, Debug)]
pub enum PrintError {
    #[error("print job failed: {0}")]
    Failed(String),
}

impl PrintError {
    pub fn failed(msg: impl Into<String>) -> Self {
        PrintError::Failed(msg.into())
    }
}
