//! Shared physical types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of chambers on the rig. Fixed by the hardware.
pub const CHAMBER_COUNT: usize = 3;

/// Upper bound of a plausible sensor reading in mbar. Values outside
/// `[0, SENSOR_RANGE_MBAR]` are treated as sensor errors.
pub const SENSOR_RANGE_MBAR: f32 = 2000.0;

/// A gauge pressure in millibar.
///
/// Calibrated sample values are signed floats; configuration bounds
/// (target, threshold, tolerance) stay unsigned integers and are converted
/// at the comparison site.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pressure(f32);

impl Pressure {
    pub const ZERO: Pressure = Pressure(0.0);

    pub fn from_mbar(mbar: f32) -> Self {
        Pressure(mbar)
    }

    pub fn mbar(self) -> f32 {
        self.0
    }

    /// Shift by a calibration offset in mbar.
    pub fn offset_by(self, delta_mbar: f32) -> Self {
        Pressure(self.0 + delta_mbar)
    }

    /// True when the raw value lies inside the sensor's plausible range.
    pub fn is_plausible(self) -> bool {
        (0.0..=SENSOR_RANGE_MBAR).contains(&self.0)
    }
}

impl fmt::Display for Pressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} mbar", self.0)
    }
}

/// Commanded state of one chamber's solenoid pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValveState {
    pub inlet_open: bool,
    pub outlet_open: bool,
}

impl ValveState {
    pub const CLOSED: ValveState = ValveState {
        inlet_open: false,
        outlet_open: false,
    };

    pub fn is_closed(self) -> bool {
        !self.inlet_open && !self.outlet_open
    }
}

/// One synchronized reading of all chamber pressures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureSample {
    /// Monotonic acquisition time in ms. Strictly increasing across samples.
    pub timestamp_ms: u64,
    pub pressures: [Pressure; CHAMBER_COUNT],
    /// Set when one or more values were clamped from an implausible reading.
    pub clamped: bool,
}

impl PressureSample {
    pub fn chamber(&self, index: usize) -> Pressure {
        self.pressures[index]
    }
}
