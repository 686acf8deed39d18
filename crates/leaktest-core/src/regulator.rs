//! Adaptive pulse-width regulation policy.
//!
//! Pure policy: given the current error and the recent pressure rate, pick
//! a valve pulse. The engine owns actuation; this module never touches
//! hardware.

use crate::state::RegulationMode;

/// Errors above this magnitude use the fast band.
pub const FAST_BAND_MBAR: f32 = 10.0;
/// Errors at or below this magnitude use the fine band.
pub const FINE_BAND_MBAR: f32 = 2.0;

/// Look-ahead horizon for the rate-predictive trim.
const PROJECTION_S: f32 = 0.5;
/// On-pulse reduction when pressure already moves the right way.
const PREDICTIVE_ON_TRIM: f32 = 0.3;
/// Off-pulse extension factor, scaled by the rate factor.
const PREDICTIVE_OFF_GAIN: f32 = 0.5;
/// Venting pulses run this much longer than filling pulses.
const VENT_PULSE_FACTOR: f32 = 1.5;

/// Pulse-width band, keyed on error magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Fast,
    Medium,
    Fine,
}

impl Band {
    pub fn for_error(abs_error_mbar: f32) -> Band {
        if abs_error_mbar > FAST_BAND_MBAR {
            Band::Fast
        } else if abs_error_mbar > FINE_BAND_MBAR {
            Band::Medium
        } else {
            Band::Fine
        }
    }

    /// Base (on, off) pulse widths in ms.
    fn base_pulse_ms(self) -> (f32, f32) {
        match self {
            Band::Fast => (100.0, 50.0),
            Band::Medium => (50.0, 100.0),
            Band::Fine => (20.0, 200.0),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Band::Fast => "fast",
            Band::Medium => "medium",
            Band::Fine => "fine",
        }
    }
}

/// One regulation step: open a valve for the on-pulse, close, then rest.
/// At most one of `inlet_ms`/`outlet_ms` is non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseCommand {
    pub inlet_ms: u64,
    pub outlet_ms: u64,
    pub rest_ms: u64,
}

impl PulseCommand {
    /// Both valves stay closed; the loop's sample cadence provides the rest.
    pub const HOLD: PulseCommand = PulseCommand {
        inlet_ms: 0,
        outlet_ms: 0,
        rest_ms: 0,
    };

    pub fn is_hold(&self) -> bool {
        self.inlet_ms == 0 && self.outlet_ms == 0
    }
}

#[derive(Debug, Default)]
pub struct AdaptiveRegulator;

impl AdaptiveRegulator {
    pub fn new() -> Self {
        Self
    }

    /// Choose the next pulse for a chamber.
    ///
    /// `error_mbar` is target minus current (positive under target);
    /// `mean_rate` is the averaged recent slope in mbar/s.
    pub fn command(
        &self,
        error_mbar: f32,
        mean_rate: Option<f32>,
        tolerance_mbar: f32,
    ) -> (PulseCommand, RegulationMode) {
        let abs_error = error_mbar.abs();
        if abs_error <= tolerance_mbar {
            return (PulseCommand::HOLD, RegulationMode::Stable);
        }

        let band = Band::for_error(abs_error);
        let (mut on_ms, mut off_ms) = band.base_pulse_ms();

        let rate = mean_rate.unwrap_or(0.0);
        // Project half a second ahead: if the error is already shrinking,
        // back off the actuation instead of fighting the momentum.
        let projected_error = error_mbar - rate * PROJECTION_S;
        if projected_error.abs() < abs_error {
            let rate_factor = (rate.abs() / 10.0).min(1.0);
            on_ms *= 1.0 - PREDICTIVE_ON_TRIM;
            off_ms *= 1.0 + PREDICTIVE_OFF_GAIN * rate_factor;
        }

        if error_mbar > 0.0 {
            let command = PulseCommand {
                inlet_ms: on_ms.round() as u64,
                outlet_ms: 0,
                rest_ms: off_ms.round() as u64,
            };
            (command, RegulationMode::Filling)
        } else {
            let command = PulseCommand {
                inlet_ms: 0,
                outlet_ms: (on_ms * VENT_PULSE_FACTOR).round() as u64,
                rest_ms: off_ms.round() as u64,
            };
            (command, RegulationMode::Venting)
        }
    }
}
