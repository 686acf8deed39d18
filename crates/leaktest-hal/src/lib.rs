//! Hardware abstraction for the multi-chamber leak tester.
//!
//! Defines the capability traits the test engine consumes (valve actuation,
//! pressure sensing, time) together with the shared physical types. Platform
//! drivers live outside this workspace; the `mock` feature provides a
//! deterministic simulated rig for desktop testing.

pub mod error;
pub mod system;
pub mod traits;
pub mod types;

#[cfg(feature = "mock")]
pub mod mock;

pub use error::{ActuatorError, SensorError};
pub use system::SystemClock;
pub use traits::{Clock, PressureSource, ValveActuator};
pub use types::{Pressure, PressureSample, ValveState, CHAMBER_COUNT};

#[cfg(feature = "mock")]
pub use mock::{MockClock, SimPressure, SimRig, SimRigConfig, SimValves, ValveWrite};
