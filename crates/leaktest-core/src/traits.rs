//! Service capability traits consumed by the engine.
//!
//! Hardware capabilities (valves, pressure, time) live in `leaktest-hal`;
//! the traits here speak core domain vocabulary (`RunRecord`, `PrintJob`,
//! `StatusSnapshot`) and are supplied by the embedding application.

use crate::error::{PrintError, StoreError};
use crate::record::{ChamberSummary, PrintJob, RunRecord};
use crate::state::StatusSnapshot;
use leaktest_hal::CHAMBER_COUNT;

/// Identifier assigned to a persisted run record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordId(pub u64);

/// Durable storage for run records.
pub trait ResultStore {
    fn save(&mut self, record: &RunRecord) -> Result<RecordId, StoreError>;
}

/// Optional label printer for passing runs.
pub trait Printer {
    fn print(&mut self, job: &PrintJob) -> Result<(), PrintError>;
}

/// Receiver for run progress and completion events.
///
/// Callbacks run on the engine's run thread; implementations should hand
/// the data off quickly and never block.
pub trait StatusObserver: Send + Sync {
    /// Called on every phase transition and at least once per second while
    /// a run is active.
    fn on_status(&self, _snapshot: &StatusSnapshot) {}

    /// Called exactly once per run, after the record has been assembled.
    fn on_complete(&self, _overall_pass: bool, _chambers: &[ChamberSummary; CHAMBER_COUNT]) {}
}
