//! Fingerprint comparison.
//!
//! Decides whether a source file already exists at the destination in
//! equivalent form. Size and integer-second mtime are always required;
//! content digests settle the tie only on targets that hash (the local
//! archive). The remote check is size+mtime only, a deliberately weaker
//! guarantee: hashing across the network costs more than the occasional
//! redundant copy it would save.

use std::path::Path;

use tracing::debug;

use crate::checksums::{compute_file_checksum, ChecksumAlgorithm};
use crate::model::{unix_seconds, Comparison, DestFingerprint, SourceFile};
use crate::target::DestinationTarget;

/// Metadata-only comparison: size and integer-second mtime.
///
/// Backs the planning pass and the first stage of the full classification.
/// `None` for the destination means absent or unreadable; both re-copy.
pub fn classify_metadata(source: &SourceFile, dest: Option<&DestFingerprint>) -> Comparison {
    let dest = match dest {
        Some(dest) => dest,
        None => return Comparison::Absent,
    };

    if source.size != dest.size {
        debug!(
            "{}: size differs ({} vs {})",
            source.file_name.to_string_lossy(),
            source.size,
            dest.size
        );
        return Comparison::Different;
    }

    if unix_seconds(source.modified) != dest.mtime_unix {
        debug!(
            "{}: mtime differs ({} vs {})",
            source.file_name.to_string_lossy(),
            unix_seconds(source.modified),
            dest.mtime_unix
        );
        return Comparison::Different;
    }

    Comparison::Identical
}

/// Full classification, with the content tiebreak where the target hashes.
///
/// On a hashing target a size+mtime match must also match digests to count
/// as identical; a hash failure on either side counts as different, the
/// conservative answer that triggers a re-copy.
pub fn classify(
    source: &SourceFile,
    dest: Option<&DestFingerprint>,
    rel: &Path,
    target: &mut dyn DestinationTarget,
    algorithm: ChecksumAlgorithm,
) -> Comparison {
    match classify_metadata(source, dest) {
        Comparison::Identical => {}
        other => return other,
    }

    let dest_hash = match target.content_hash(rel, algorithm) {
        // Metadata-only target: size+mtime equality is final.
        None => return Comparison::Identical,
        Some(Ok(hash)) => hash,
        Some(Err(e)) => {
            debug!("destination hash failed for {}: {}", rel.display(), e);
            return Comparison::Different;
        }
    };

    let source_hash = match compute_file_checksum(&source.path, algorithm) {
        Ok(hash) => hash,
        Err(e) => {
            debug!("source hash failed for {}: {}", source.path.display(), e);
            return Comparison::Different;
        }
    };

    if source_hash.hex() == dest_hash.hex() {
        Comparison::Identical
    } else {
        debug!(
            "{}: same size and mtime but digests differ",
            source.file_name.to_string_lossy()
        );
        Comparison::Different
    }
}
