//! Archive layout: where a source file lands at the destination.
//!
//! Files are partitioned into one flat directory per calendar day, named by
//! the 8-digit local-time date of the file's creation timestamp:
//! `<base>/YYYYMMDD/<original filename>`. Filenames are preserved verbatim;
//! name collisions are handled by the comparator, never by renaming.

use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Local};

use crate::model::SourceFile;

/// Formats a timestamp as the 8-digit local-time date folder name.
pub fn date_folder(created: SystemTime) -> String {
    let local: DateTime<Local> = created.into();
    local.format("%Y%m%d").to_string()
}

/// Destination path of a file relative to the archive base.
pub fn relative_dest(file: &SourceFile) -> PathBuf {
    PathBuf::from(date_folder(file.created)).join(&file.file_name)
}
