//! Progress reporting traits.
//!
//! This module decouples the import engine from any rendering surface.
//! `ProgressSink` carries byte counts out of a single transfer;
//! `ImportObserver` carries per-file and run-level events out of the driver,
//! which forwards transfer progress to it. The CLI renders the events on
//! the console.

use crate::model::{ImportJob, RunSummary, SourceFile, TransferOutcome};

/// Receives byte counts while one file is being transferred.
///
/// `bytes_transferred` is the running total for the file (not a delta),
/// reported together with the file's full size. Updates arrive at block
/// granularity; receivers that render are expected to coalesce.
pub trait ProgressSink {
    fn update(&mut self, bytes_transferred: u64, total_bytes: u64);
}

impl<F: FnMut(u64, u64)> ProgressSink for F {
    fn update(&mut self, bytes_transferred: u64, total_bytes: u64) {
        self(bytes_transferred, total_bytes)
    }
}

/// Trait for receiving per-file and run-level events from the driver.
///
/// All methods are called synchronously during job execution, in file
/// order. Default bodies are no-ops so implementations take only the
/// events they care about.
pub trait ImportObserver: Send {
    /// Called when job execution starts.
    fn on_run_started(&mut self, _job: &ImportJob) {}

    /// Called when a file is about to be classified and possibly copied.
    fn on_file_started(&mut self, _index: usize, _total: usize, _file: &SourceFile) {}

    /// Called periodically as bytes are written for the current file.
    fn on_file_progress(&mut self, _file: &SourceFile, _bytes_transferred: u64, _total_bytes: u64) {
    }

    /// Called when a file reaches a terminal outcome (copied, skipped, failed).
    fn on_file_completed(&mut self, _index: usize, _file: &SourceFile, _outcome: &TransferOutcome) {
    }

    /// Called when job execution is complete (all files processed).
    fn on_run_completed(&mut self, _job: &ImportJob, _summary: &RunSummary) {}
}
