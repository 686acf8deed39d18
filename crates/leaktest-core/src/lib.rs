//! Test execution engine for the multi-chamber leak tester.
//!
//! Drives automated leak tests on three pneumatic chambers in parallel:
//! fill to target, regulate into tolerance, verify stability, hold for the
//! test duration against a failure threshold, then vent and persist the
//! result. Hardware is reached only through the capability traits in
//! `leaktest-hal`; persistence, printing and status reporting go through
//! the service traits in [`traits`].

pub mod chamber;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod record;
pub mod regulator;
pub mod sampling;
pub mod sink;
pub mod state;
pub mod traits;

pub use chamber::ChamberController;
pub use config::{ChamberConfig, TestConfig, TestMode};
pub use engine::{Engine, Resources, RunOutcome, StopLatch, TestRun};
pub use error::{PrintError, RunError, StartError, StoreError};
pub use record::{ChamberSummary, PrintJob, RunRecord};
pub use regulator::{AdaptiveRegulator, Band, PulseCommand};
pub use sink::{ResultSink, SinkOptions};
pub use state::{ChamberPhase, ChamberStatus, RegulationMode, RunState, StatusSnapshot};
pub use traits::{Printer, RecordId, ResultStore, StatusObserver};
