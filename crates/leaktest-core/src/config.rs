//! Run configuration and tuning constants.
//!
//! A [`TestConfig`] is resolved by the caller (settings UI, reference
//! database, CLI) before a run starts and stays frozen for the run's
//! duration. The engine never looks anything up.

use serde::{Deserialize, Serialize};

use crate::error::StartError;
use leaktest_hal::CHAMBER_COUNT;

/// Highest allowed target pressure in mbar.
pub const MAX_TARGET_MBAR: u32 = 600;
/// Calibration offsets are clamped to +/- this many mbar.
pub const CAL_OFFSET_RANGE_MBAR: f32 = 50.0;

/// Deadline for all chambers to reach target during Filling.
pub const FILL_TIMEOUT_MS: u64 = 60_000;
/// Deadline for regulation to settle; expiry is non-fatal.
pub const REGULATION_TIMEOUT_MS: u64 = 60_000;
/// Length of the stability verification window.
pub const STABILITY_DURATION_MS: u64 = 25_000;
/// Consecutive in-tolerance samples required to leave Regulating.
pub const STABILITY_STREAK: u32 = 5;
/// Samples inspected by the stability criterion.
pub const STABILITY_WINDOW: usize = 20;
/// Deadline for venting during Emptying.
pub const EMPTY_TIMEOUT_MS: u64 = 10_000;
/// A chamber counts as empty at or below this pressure.
pub const EMPTY_PRESSURE_MBAR: f32 = 5.0;
/// Forced both-closed settling time before any inlet opens.
pub const VALVE_DEAD_TIME_MS: u64 = 50;

/// Sampling period while valves may move.
pub const SAMPLE_PERIOD_ACTIVE_MS: u64 = 100;
/// Sampling period while the loop is purely observing.
pub const SAMPLE_PERIOD_MONITOR_MS: u64 = 50;
/// Read attempts per sample before the sample is abandoned.
pub const SENSOR_RETRY_MAX: u32 = 3;
/// Pause between read attempts.
pub const SENSOR_RETRY_BACKOFF_MS: u64 = 100;
/// Abandoned samples in a row before the sensor is declared dead.
pub const MAX_CONSECUTIVE_SENSOR_ERRORS: u32 = 5;

/// Save attempts for the run record.
pub const STORE_RETRY_MAX: u32 = 3;
/// Pause between save attempts.
pub const STORE_RETRY_BACKOFF_MS: u64 = 1_000;

/// Static per-chamber test parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChamberConfig {
    /// Disabled chambers are never actuated and always report `result: false`.
    pub enabled: bool,
    /// Fill/regulation target in mbar.
    pub target_mbar: u32,
    /// Failure floor during Testing. Must stay below the target.
    pub threshold_mbar: u32,
    /// Half-width of the regulation band around the target.
    pub tolerance_mbar: u32,
    /// Calibration offset added to the raw sensor reading.
    pub offset_mbar: f32,
}

impl Default for ChamberConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_mbar: 300,
            threshold_mbar: 290,
            tolerance_mbar: 5,
            offset_mbar: 0.0,
        }
    }
}

impl ChamberConfig {
    pub fn validate(&self, index: usize) -> Result<(), StartError> {
        if !self.enabled {
            return Ok(());
        }
        if self.target_mbar == 0 || self.target_mbar > MAX_TARGET_MBAR {
            return Err(StartError::config_invalid(format!(
                "chamber {}: target must be 1-{} mbar, got {}",
                index + 1,
                MAX_TARGET_MBAR,
                self.target_mbar
            )));
        }
        if self.threshold_mbar >= self.target_mbar {
            return Err(StartError::config_invalid(format!(
                "chamber {}: threshold ({} mbar) must be below target ({} mbar)",
                index + 1,
                self.threshold_mbar,
                self.target_mbar
            )));
        }
        if self.tolerance_mbar == 0 {
            return Err(StartError::config_invalid(format!(
                "chamber {}: tolerance must be positive",
                index + 1
            )));
        }
        Ok(())
    }

    /// Calibration offset with the permitted range applied.
    pub fn clamped_offset(&self) -> f32 {
        self.offset_mbar
            .clamp(-CAL_OFFSET_RANGE_MBAR, CAL_OFFSET_RANGE_MBAR)
    }
}

/// How the run's parameters were selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestMode {
    /// Parameters entered directly.
    Manual,
    /// Parameters resolved from a stored profile selected by barcode.
    Reference { barcode: String },
}

impl TestMode {
    pub fn label(&self) -> &'static str {
        match self {
            TestMode::Manual => "manual",
            TestMode::Reference { .. } => "reference",
        }
    }

    pub fn reference(&self) -> Option<&str> {
        match self {
            TestMode::Manual => None,
            TestMode::Reference { barcode } => Some(barcode),
        }
    }
}

/// Resolved inputs for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestConfig {
    pub chambers: [ChamberConfig; CHAMBER_COUNT],
    pub test_duration_s: u32,
    pub mode: TestMode,
    pub operator_id: Option<String>,
    pub operator_name: Option<String>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            chambers: std::array::from_fn(|_| ChamberConfig::default()),
            test_duration_s: 60,
            mode: TestMode::Manual,
            operator_id: None,
            operator_name: None,
        }
    }
}

impl TestConfig {
    pub fn validate(&self) -> Result<(), StartError> {
        if !self.chambers.iter().any(|c| c.enabled) {
            return Err(StartError::NoChambersEnabled);
        }
        if self.test_duration_s == 0 {
            return Err(StartError::config_invalid(
                "test duration must be at least 1 s",
            ));
        }
        if let TestMode::Reference { barcode } = &self.mode {
            if barcode.is_empty() {
                return Err(StartError::config_invalid(
                    "reference mode requires a barcode",
                ));
            }
        }
        for (index, chamber) in self.chambers.iter().enumerate() {
            chamber.validate(index)?;
        }
        Ok(())
    }

    /// Indices of the enabled chambers.
    pub fn enabled_chambers(&self) -> impl Iterator<Item = usize> + '_ {
        self.chambers
            .iter()
            .enumerate()
            .filter(|(_, c)| c.enabled)
            .map(|(i, _)| i)
    }
}
