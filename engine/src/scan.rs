//! Source tree enumeration.
//!
//! Walks the source root recursively and produces the list of regular files
//! that are candidates for import. Hidden files (names starting with `.`)
//! are excluded. An entry whose metadata cannot be read is logged and left
//! out entirely; it is never a candidate and never counted.

use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use std::time::SystemTime;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::model::SourceFile;

/// Returns true for names the importer treats as hidden.
///
/// Only file names are checked; hidden directories are still traversed, so
/// a regular file inside one is imported as usual.
pub fn is_hidden(file_name: &OsStr) -> bool {
    file_name.as_encoded_bytes().starts_with(b".")
}

/// Best available creation time for a file.
///
/// Birth time where the platform records one, else the metadata-change
/// time on Unix, else the modification time.
fn creation_time(metadata: &fs::Metadata, modified: SystemTime) -> SystemTime {
    if let Ok(birth) = metadata.created() {
        return birth;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        let secs = metadata.ctime();
        if secs >= 0 {
            return SystemTime::UNIX_EPOCH
                + std::time::Duration::new(secs as u64, metadata.ctime_nsec() as u32);
        }
    }

    modified
}

/// Enumerate all candidate files under `root`, sorted by path.
///
/// Unreadable entries are skipped with a warning rather than failing the
/// run; the caller has already validated that `root` itself exists.
pub fn enumerate_source(root: &Path) -> Vec<SourceFile> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let file_name = entry.file_name().to_os_string();
        if is_hidden(&file_name) {
            debug!("excluding hidden file {}", entry.path().display());
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("skipping {}: metadata unreadable: {}", entry.path().display(), e);
                continue;
            }
        };

        let modified = match metadata.modified() {
            Ok(modified) => modified,
            Err(e) => {
                warn!("skipping {}: no modification time: {}", entry.path().display(), e);
                continue;
            }
        };

        files.push(SourceFile {
            file_name,
            size: metadata.len(),
            modified,
            created: creation_time(&metadata, modified),
            path: entry.into_path(),
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    files
}
