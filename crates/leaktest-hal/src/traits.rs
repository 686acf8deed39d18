//! Capability traits consumed by the test engine.
//!
//! The engine never talks to GPIO or ADC hardware directly; platform
//! integrations implement these traits and hand them to the engine at
//! construction time.

use crate::error::{ActuatorError, SensorError};
use crate::types::CHAMBER_COUNT;

/// Solenoid valve actuation for all chambers.
///
/// Implementations perform the raw write only. Sequencing rules (mutual
/// exclusion, dead time, close-on-error) are enforced by the engine's valve
/// gate, which is the sole caller.
pub trait ValveActuator {
    /// Drive both solenoids of one chamber to the given state.
    fn set_chamber_valves(
        &mut self,
        chamber: usize,
        inlet_open: bool,
        outlet_open: bool,
    ) -> Result<(), ActuatorError>;
}

/// Analog pressure acquisition for all chambers.
pub trait PressureSource {
    /// Read all chamber pressures in mbar, uncalibrated.
    ///
    /// Per-chamber calibration offsets are applied by the sampling layer.
    fn read_all(&mut self) -> Result<[f32; CHAMBER_COUNT], SensorError>;
}

/// Monotonic time and pacing services.
///
/// All engine timeouts are absolute deadlines, so the sleeping primitive is
/// deadline-based; sampling jitter then cannot stretch or shorten a phase.
pub trait Clock {
    /// Milliseconds since an arbitrary fixed origin. Monotonic.
    fn now_ms(&self) -> u64;

    /// Sleep until the given deadline. Returns immediately if it has passed.
    fn sleep_until_ms(&mut self, deadline_ms: u64);

    /// Relative sleep, expressed through the deadline primitive.
    fn sleep_ms(&mut self, duration_ms: u64) {
        let deadline = self.now_ms().saturating_add(duration_ms);
        self.sleep_until_ms(deadline);
    }

    /// RFC-3339 wall-clock timestamp, used to stamp run records.
    fn wall_timestamp(&self) -> String;
}
