//! Run record persistence, optional printing, and completion fan-out.

use std::sync::Arc;

use crate::config::{STORE_RETRY_BACKOFF_MS, STORE_RETRY_MAX};
use crate::error::StoreError;
use crate::record::{PrintJob, RunRecord};
use crate::traits::{Printer, RecordId, ResultStore, StatusObserver};
use leaktest_hal::Clock;

/// Commit-time options.
#[derive(Debug, Clone, Copy)]
pub struct SinkOptions {
    /// Emit a print job when the run passes and a printer is present.
    pub print_on_pass: bool,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            print_on_pass: true,
        }
    }
}

/// Owns the result store for one run and guarantees at-most-once
/// persistence of that run's record.
pub struct ResultSink<S> {
    store: S,
    saved: bool,
}

impl<S: ResultStore> ResultSink<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            saved: false,
        }
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    /// Persist the record (with retry), print on pass, and notify
    /// observers of completion.
    ///
    /// Persistence failure is reported to the caller but neither stops the
    /// print/observer steps nor alters the run's result. A second commit
    /// after a successful save is a complete no-op.
    pub fn commit(
        &mut self,
        clock: &mut impl Clock,
        record: &RunRecord,
        printer: Option<&mut dyn Printer>,
        observers: &[Arc<dyn StatusObserver>],
        options: SinkOptions,
    ) -> Result<Option<RecordId>, StoreError> {
        if self.saved {
            log::info!("run record already persisted, skipping commit");
            return Ok(None);
        }

        let save_result = self.save_with_retry(clock, record);
        if save_result.is_ok() {
            self.saved = true;
        }

        if record.overall_pass && options.print_on_pass {
            if let Some(printer) = printer {
                let job = PrintJob::for_record(record);
                match printer.print(&job) {
                    Ok(()) => log::info!("pass ticket printed for {}", record.reference),
                    // Printing never fails the run.
                    Err(e) => log::error!("printing failed: {}", e),
                }
            }
        }

        for observer in observers {
            observer.on_complete(record.overall_pass, &record.chambers);
        }

        save_result.map(Some)
    }

    fn save_with_retry(
        &mut self,
        clock: &mut impl Clock,
        record: &RunRecord,
    ) -> Result<RecordId, StoreError> {
        let mut last_error = None;
        for attempt in 1..=STORE_RETRY_MAX {
            match self.store.save(record) {
                Ok(id) => {
                    log::info!("run record persisted (attempt {attempt})");
                    return Ok(id);
                }
                Err(e) => {
                    log::warn!("record save attempt {attempt} failed: {e}");
                    last_error = Some(e);
                    if attempt < STORE_RETRY_MAX {
                        clock.sleep_ms(STORE_RETRY_BACKOFF_MS);
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| StoreError::unavailable("no save attempts made")))
    }
}
