//! Local-archive destination.
//!
//! Implements `DestinationTarget` for a directory on the local filesystem:
//! block-streamed copies that preserve modification time and permissions,
//! and content hashing for the duplicate tiebreak.

use std::fs;
use std::io;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use crate::checksums::{compute_file_checksum, ChecksumAlgorithm, ChecksumValue};
use crate::error::EngineError;
use crate::job::cancel_requested;
use crate::model::{unix_seconds, DestFingerprint, SourceFile};
use crate::progress::ProgressSink;
use crate::target::DestinationTarget;

/// Copy block size. Progress is reported once per block.
pub const TRANSFER_BLOCK_SIZE: usize = 64 * 1024;

/// Archive rooted at a local directory.
pub struct LocalTarget {
    base: PathBuf,
}

impl LocalTarget {
    pub fn new(base: PathBuf) -> Self {
        LocalTarget { base }
    }

    fn full_path(&self, rel: &Path) -> PathBuf {
        self.base.join(rel)
    }

    /// Stamp destination metadata from the source: permission bits and the
    /// modification time the next run's comparison will check.
    fn preserve_metadata(&self, dst: &Path, source: &SourceFile) -> Result<(), EngineError> {
        let src_metadata = fs::metadata(&source.path).map_err(|e| EngineError::Read {
            path: source.path.clone(),
            source: e,
        })?;

        fs::set_permissions(dst, src_metadata.permissions()).map_err(|e| EngineError::Write {
            path: dst.to_path_buf(),
            source: e,
        })?;

        filetime::set_file_mtime(dst, filetime::FileTime::from_system_time(source.modified))
            .map_err(|e| EngineError::Write {
                path: dst.to_path_buf(),
                source: e,
            })
    }
}

impl DestinationTarget for LocalTarget {
    fn label(&self) -> String {
        self.base.display().to_string()
    }

    fn check(&mut self) -> Result<(), EngineError> {
        // The archive base is created eagerly so a bad destination fails
        // the run before enumeration starts.
        fs::create_dir_all(&self.base).map_err(|e| EngineError::CreateDir {
            path: self.base.clone(),
            source: e,
        })
    }

    fn stat(&mut self, rel: &Path) -> Option<DestFingerprint> {
        let path = self.full_path(rel);
        let metadata = fs::metadata(&path).ok()?;
        if !metadata.is_file() {
            return None;
        }
        let modified = metadata.modified().ok()?;
        Some(DestFingerprint {
            size: metadata.len(),
            mtime_unix: unix_seconds(modified),
        })
    }

    fn ensure_dir(&mut self, rel: &Path) -> Result<(), EngineError> {
        let dir = self.full_path(rel);
        match fs::metadata(&dir) {
            Ok(metadata) if metadata.is_dir() => Ok(()),
            Ok(_) => Err(EngineError::CreateDir {
                path: dir,
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "path exists but is not a directory",
                ),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                fs::create_dir_all(&dir).map_err(|e| EngineError::CreateDir {
                    path: dir,
                    source: e,
                })
            }
            Err(e) => Err(EngineError::CreateDir {
                path: dir,
                source: e,
            }),
        }
    }

    fn content_hash(
        &mut self,
        rel: &Path,
        algorithm: ChecksumAlgorithm,
    ) -> Option<Result<ChecksumValue, EngineError>> {
        Some(compute_file_checksum(&self.full_path(rel), algorithm))
    }

    fn transfer(
        &mut self,
        source: &SourceFile,
        rel: &Path,
        progress: &mut dyn ProgressSink,
        cancel: Option<&AtomicBool>,
    ) -> Result<u64, EngineError> {
        let dst = self.full_path(rel);

        // Zero-byte files take a metadata-only path: the streaming loop
        // (and its progress reporting) never runs.
        if source.size == 0 {
            fs::File::create(&dst).map_err(|e| EngineError::Write {
                path: dst.clone(),
                source: e,
            })?;
            self.preserve_metadata(&dst, source)?;
            return Ok(0);
        }

        let mut src_file = fs::File::open(&source.path).map_err(|e| EngineError::Read {
            path: source.path.clone(),
            source: e,
        })?;

        // Truncating create: an existing different file is rewritten in
        // place, and an aborted write leaves a partial for the next run to
        // reclassify.
        let mut dst_file = fs::File::create(&dst).map_err(|e| EngineError::Write {
            path: dst.clone(),
            source: e,
        })?;

        let mut buffer = [0u8; TRANSFER_BLOCK_SIZE];
        let mut copied: u64 = 0;

        loop {
            if cancel_requested(cancel) {
                return Err(EngineError::Cancelled);
            }

            let n = src_file.read(&mut buffer).map_err(|e| EngineError::Read {
                path: source.path.clone(),
                source: e,
            })?;
            if n == 0 {
                break;
            }

            dst_file
                .write_all(&buffer[..n])
                .map_err(|e| EngineError::Write {
                    path: dst.clone(),
                    source: e,
                })?;

            copied += n as u64;
            progress.update(copied, source.size);
        }

        drop(dst_file);

        // Metadata goes on only after the full content is written, so a
        // partial never carries a matching mtime.
        self.preserve_metadata(&dst, source)?;

        Ok(copied)
    }

    fn describe(&self, rel: &Path) -> String {
        self.full_path(rel).display().to_string()
    }

    fn close(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}
