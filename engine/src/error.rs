//! Error types for the import engine.
//!
//! The primary error type is `EngineError`. Setup variants (missing source,
//! unreachable remote) abort a run before any file is processed; per-file
//! variants are contained by the driver, which records them in the run
//! summary and moves on to the next file.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the engine.
///
/// Only setup errors and `Cancelled` ever propagate out of a run; everything
/// else is folded into a per-file `Failed` outcome by the driver.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Source directory does not exist
    #[error("source directory not found: {path}")]
    SourceMissing { path: PathBuf },

    /// Source path exists but is not a directory
    #[error("source is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Failed to read from a source file
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write to a destination file
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to create a destination directory
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Could not open a TCP connection to the remote host
    #[error("cannot connect to {host}: {source}")]
    Connect {
        host: String,
        #[source]
        source: io::Error,
    },

    /// An SSH-level operation failed
    #[error("ssh {op} failed: {source}")]
    Ssh {
        op: &'static str,
        #[source]
        source: ssh2::Error,
    },

    /// Neither the agent nor the configured key authenticated
    #[error("authentication failed for {user}@{host}")]
    AuthFailed { user: String, host: String },

    /// A remote command ran but reported a nonzero exit status
    #[error("remote command `{command}` exited with status {status}")]
    RemoteCommand { command: String, status: i32 },

    /// A remote command exited cleanly but produced the wrong reply
    #[error("remote command `{command}` returned unexpected output {output:?}")]
    RemoteReply { command: String, output: String },

    /// Reading a remote command's output failed mid-stream
    #[error("remote command `{command}` i/o failed: {source}")]
    RemoteCommandIo {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The job is not in a state that allows the requested step
    #[error("job is not ready: {reason}")]
    InvalidState { reason: String },

    /// The run was interrupted by the user
    #[error("cancelled")]
    Cancelled,
}

impl EngineError {
    /// Returns true for the user-interrupt case, which exits cleanly rather
    /// than as a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }
}
