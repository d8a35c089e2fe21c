//! Core data model for import runs.
//!
//! This module defines the main data structures for representing an import:
//! - ImportConfig: where to read from, where to archive to, how to compare
//! - ImportJob: one full run over a source tree
//! - SourceFile, DestFingerprint: the two sides of a comparison
//! - Comparison, TransferOutcome, RunSummary: classification and results

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checksums::ChecksumAlgorithm;

/// Configuration for one import run, supplied by the caller.
///
/// There is no process-wide configuration state; the driver only ever sees
/// the value handed to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Root of the source tree to enumerate (typically a card mount)
    pub source_root: PathBuf,

    /// Where the archive lives
    pub destination: DestinationSpec,

    /// Digest used for the local duplicate tiebreak
    pub algorithm: ChecksumAlgorithm,
}

/// The destination side of a run: a local archive or a remote mirror.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DestinationSpec {
    /// Archive rooted at a local directory
    Local {
        /// Base directory; date folders are created beneath it
        base: PathBuf,
    },
    /// Archive rooted at a directory on a remote host
    Remote {
        /// Base directory on the remote side, POSIX-style
        base: String,
        /// How to reach and authenticate against the host
        host: RemoteConfig,
    },
}

/// Connection settings for a remote destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Host name or address
    pub host: String,

    /// User to authenticate as
    pub user: String,

    /// SSH port
    pub port: u16,

    /// TCP connect timeout
    pub connect_timeout: Duration,

    /// Private key to try after the agent; agent-offered keys are tried first
    pub identity_file: Option<PathBuf>,

    /// Append to an existing shorter remote file instead of rewriting it.
    /// Trusts that the existing bytes are a prefix of the source, which
    /// holds for this tool's own interrupted transfers but not for
    /// arbitrary pre-existing files.
    pub resume: bool,
}

/// A regular file discovered under the source root.
///
/// Immutable for the duration of one run; the content hash is not part of
/// the struct because it is computed lazily, only when a comparison needs
/// the tiebreak.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Absolute path on the source filesystem
    pub path: PathBuf,

    /// Base name, preserved verbatim at the destination; not assumed to
    /// be valid UTF-8
    pub file_name: OsString,

    /// Size in bytes
    pub size: u64,

    /// Modification time; compared at integer-second precision
    pub modified: SystemTime,

    /// Creation time: birth time where the platform records one, else the
    /// metadata-change time, else the modification time
    pub created: SystemTime,
}

/// Metadata of an existing destination file, as seen by the comparator.
///
/// `None` in the surrounding `Option` means the file is absent or its
/// metadata could not be read; both cases classify as needing a copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestFingerprint {
    /// Size in bytes
    pub size: u64,

    /// Modification time as whole seconds since the Unix epoch
    pub mtime_unix: i64,
}

/// How a source file relates to what is already at its destination path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Destination holds an equivalent file; nothing to transfer
    Identical,
    /// Destination holds something else; overwrite it
    Different,
    /// Nothing at the destination path
    Absent,
}

impl Comparison {
    /// Returns true if this classification calls for a transfer.
    pub fn needs_copy(&self) -> bool {
        matches!(self, Comparison::Different | Comparison::Absent)
    }
}

impl std::fmt::Display for Comparison {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Comparison::Identical => write!(f, "identical"),
            Comparison::Different => write!(f, "different"),
            Comparison::Absent => write!(f, "absent"),
        }
    }
}

/// Terminal result for one file within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Content now at the destination
    Copied,
    /// Already present in equivalent form; not transferred
    Skipped,
    /// Transfer attempted and aborted; partial data may remain
    Failed(String),
}

impl std::fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferOutcome::Copied => write!(f, "copied"),
            TransferOutcome::Skipped => write!(f, "skipped"),
            TransferOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// A failed file, kept for the end-of-run report.
#[derive(Debug, Clone, Serialize)]
pub struct TransferFailure {
    /// Base name of the file that failed, decoded lossily for the report
    pub file_name: String,

    /// Why the transfer was aborted
    pub reason: String,
}

/// Aggregate counts for a completed run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Files transferred
    pub copied: usize,

    /// Files already present in equivalent form
    pub skipped: usize,

    /// Files whose transfer was aborted
    pub failed: usize,

    /// Bytes written across all copied files
    pub bytes_copied: u64,

    /// One entry per failed file, in processing order
    pub failures: Vec<TransferFailure>,
}

impl RunSummary {
    /// Total files that reached a terminal state.
    pub fn total_processed(&self) -> usize {
        self.copied + self.skipped + self.failed
    }
}

/// Result of the dry planning pass.
///
/// Classification here is metadata-only (no hashing), so the copy count is
/// an expectation for progress context, not a commitment; the real pass
/// re-evaluates each file live.
#[derive(Debug, Clone)]
pub struct ImportPlan {
    /// Planned classification per enumerated file, same order as the file list
    pub actions: Vec<Comparison>,

    /// Files expected to need a transfer
    pub to_copy: usize,

    /// Byte total across the files expected to need a transfer
    pub to_copy_bytes: u64,
}

/// The state of an entire import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Created, not yet started
    Pending,
    /// Currently executing
    Running,
    /// All files processed (some may have failed)
    Completed,
}

/// One full import run over a source tree.
#[derive(Debug)]
pub struct ImportJob {
    /// Unique identifier, used to correlate log lines
    pub id: Uuid,

    /// Configuration this run was created with
    pub config: ImportConfig,

    /// Files discovered under the source root, sorted by path
    pub files: Vec<SourceFile>,

    /// Planning-pass result, set by `plan_job`
    pub plan: Option<ImportPlan>,

    /// Current run state
    pub state: JobState,

    /// When the job was created
    pub created_at: SystemTime,

    /// When execution started
    pub start_time: Option<SystemTime>,

    /// When execution completed
    pub end_time: Option<SystemTime>,
}

/// Converts a timestamp to whole seconds since the Unix epoch, truncating
/// toward zero like the fingerprint comparison expects.
pub fn unix_seconds(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(since) => since.as_secs() as i64,
        Err(before) => -(before.duration().as_secs() as i64),
    }
}
