//! Persisted run summary and the derived print job.

use serde::{Deserialize, Serialize};

use crate::config::{ChamberConfig, TestConfig};
use leaktest_hal::CHAMBER_COUNT;

/// Substitute for absent operator and reference fields.
const ABSENT: &str = "N/A";

/// One chamber's row in the persisted record.
///
/// Every index is present even for disabled chambers, to preserve the
/// positional semantics of the store schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChamberSummary {
    pub enabled: bool,
    pub pressure_target: f32,
    pub pressure_threshold: f32,
    pub pressure_tolerance: f32,
    pub start_pressure: f32,
    pub final_pressure: f32,
    pub mean_pressure: f32,
    pub pressure_std: f32,
    pub result: bool,
}

impl ChamberSummary {
    /// Row for a chamber that never took part in the run.
    pub fn disabled(config: &ChamberConfig) -> Self {
        Self {
            enabled: false,
            pressure_target: config.target_mbar as f32,
            pressure_threshold: config.threshold_mbar as f32,
            pressure_tolerance: config.tolerance_mbar as f32,
            start_pressure: 0.0,
            final_pressure: 0.0,
            mean_pressure: 0.0,
            pressure_std: 0.0,
            result: false,
        }
    }

    /// Pressure lost over the Testing phase.
    pub fn pressure_drop(&self) -> f32 {
        self.start_pressure - self.final_pressure
    }
}

/// The persisted summary of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// RFC-3339 stamp assigned when the run completes.
    pub timestamp: String,
    pub operator_id: String,
    pub operator_name: String,
    /// Barcode for reference runs, `"N/A"` for manual runs.
    pub reference: String,
    /// `"manual"` or `"reference"`.
    pub mode: String,
    pub duration_s: u32,
    pub overall_pass: bool,
    /// Description of the fault that aborted the run, `None` for a run
    /// that reached its verdict normally. Lets storage distinguish a
    /// sensor or actuator abort from an ordinary failed test.
    pub fault: Option<String>,
    pub chambers: [ChamberSummary; CHAMBER_COUNT],
}

impl RunRecord {
    pub fn assemble(
        config: &TestConfig,
        timestamp: String,
        overall_pass: bool,
        fault: Option<String>,
        chambers: [ChamberSummary; CHAMBER_COUNT],
    ) -> Self {
        Self {
            timestamp,
            operator_id: config
                .operator_id
                .clone()
                .unwrap_or_else(|| ABSENT.to_string()),
            operator_name: config
                .operator_name
                .clone()
                .unwrap_or_else(|| ABSENT.to_string()),
            reference: config
                .mode
                .reference()
                .map(str::to_string)
                .unwrap_or_else(|| ABSENT.to_string()),
            mode: config.mode.label().to_string(),
            duration_s: config.test_duration_s,
            overall_pass,
            fault,
            chambers,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Content of the pass ticket. Rendering belongs to the printer backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintJob {
    pub operator_id: String,
    /// Reference with the site prefix (first 3 characters) removed.
    pub model: String,
    /// Reference with the full prefix (first 7 characters) removed.
    pub barcode: String,
    pub date: String,
    pub time: String,
    pub banner: String,
}

impl PrintJob {
    pub fn for_record(record: &RunRecord) -> Self {
        let (date, time) = split_timestamp(&record.timestamp);
        Self {
            operator_id: record.operator_id.clone(),
            model: strip_prefix_chars(&record.reference, 3),
            barcode: strip_prefix_chars(&record.reference, 7),
            date,
            time,
            banner: String::from("LEAK TEST PASS"),
        }
    }
}

/// Drop the first `n` characters, keeping the whole string when it is too
/// short to strip.
fn strip_prefix_chars(reference: &str, n: usize) -> String {
    if reference.chars().count() > n {
        reference.chars().skip(n).collect()
    } else {
        reference.to_string()
    }
}

fn split_timestamp(timestamp: &str) -> (String, String) {
    match timestamp.split_once('T') {
        Some((date, rest)) => {
            let time: String = rest.chars().take(8).collect();
            (date.to_string(), time)
        }
        None => (timestamp.to_string(), String::new()),
    }
}
