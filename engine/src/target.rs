//! Destination capability interface.
//!
//! The driver and comparator are written once against `DestinationTarget`;
//! the local-archive and remote-mirror implementations differ in transfer
//! mechanics and in whether destination content can be hashed, and those
//! differences stay inside the implementations.

use std::path::Path;
use std::sync::atomic::AtomicBool;

use crate::checksums::{ChecksumAlgorithm, ChecksumValue};
use crate::error::EngineError;
use crate::local::LocalTarget;
use crate::model::{DestFingerprint, DestinationSpec, SourceFile};
use crate::progress::ProgressSink;
use crate::remote::RemoteTarget;

/// Capabilities the driver needs from a destination.
pub trait DestinationTarget {
    /// Short description of the base, for logs and messages.
    fn label(&self) -> String;

    /// Preflight check, run before any enumeration. A failure here aborts
    /// the run as a setup error.
    fn check(&mut self) -> Result<(), EngineError>;

    /// Metadata of the file at `rel` under the base.
    ///
    /// `None` covers both "absent" and "could not stat"; either way the
    /// caller re-copies, which is the conservative choice.
    fn stat(&mut self, rel: &Path) -> Option<DestFingerprint>;

    /// Create the directory at `rel` under the base. Idempotent; an
    /// already-existing directory is success.
    fn ensure_dir(&mut self, rel: &Path) -> Result<(), EngineError>;

    /// Digest of the destination file's content, for the duplicate
    /// tiebreak.
    ///
    /// Returns `None` when this target does not hash at all (the remote
    /// case, where size+mtime equality is final); `Some(Err(..))` when
    /// hashing was attempted and failed.
    fn content_hash(
        &mut self,
        rel: &Path,
        algorithm: ChecksumAlgorithm,
    ) -> Option<Result<ChecksumValue, EngineError>>;

    /// Copy one source file to `rel` under the base, overwriting in place.
    ///
    /// Reports running byte counts to `progress` and aborts between blocks
    /// once `cancel` is set. On error the partial destination file is left
    /// as-is; the next run reclassifies and re-copies it. Returns the
    /// number of bytes written.
    fn transfer(
        &mut self,
        source: &SourceFile,
        rel: &Path,
        progress: &mut dyn ProgressSink,
        cancel: Option<&AtomicBool>,
    ) -> Result<u64, EngineError>;

    /// Full destination path of `rel`, for reporting.
    fn describe(&self, rel: &Path) -> String;

    /// Release any held session. Called once when the run ends, including
    /// on cancellation.
    fn close(&mut self) -> Result<(), EngineError>;
}

/// Open the destination described by the configuration.
///
/// For a remote destination this establishes the one SSH session that
/// every subsequent query, command, and transfer of the run reuses; a
/// connection or authentication failure here is a setup error.
pub fn connect(spec: &DestinationSpec) -> Result<Box<dyn DestinationTarget>, EngineError> {
    match spec {
        DestinationSpec::Local { base } => Ok(Box::new(LocalTarget::new(base.clone()))),
        DestinationSpec::Remote { base, host } => {
            Ok(Box::new(RemoteTarget::connect(base.clone(), host)?))
        }
    }
}
