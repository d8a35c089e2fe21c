//! # Offload Engine - Media Import Library
//!
//! A headless engine for offloading camera cards into a date-partitioned
//! archive, local or remote. Designed as the foundation for multiple
//! frontends (CLI, automation).
//!
//! ## Overview
//!
//! The engine imports every visible file under a source tree into
//! `base/YYYYMMDD/<filename>` on the destination, skipping files that are
//! already there in equivalent form. It features:
//! - Recursive source enumeration with hidden-file exclusion
//! - Size, mtime and content-hash duplicate detection
//! - Date partitioning by file creation time
//! - Local and SSH destinations behind one target interface
//! - Per-file error isolation and end-of-run reporting
//! - Progress reporting via callbacks (decoupled from UI technology)
//!
//! ## Basic Usage
//!
//! ```no_run
//! use engine::{create_job, plan_job, run_job, connect};
//! use engine::{ChecksumAlgorithm, DestinationSpec, ImportConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ImportConfig {
//!     source_root: "/media/card".into(),
//!     destination: DestinationSpec::Local {
//!         base: "/srv/archive".into(),
//!     },
//!     algorithm: ChecksumAlgorithm::Md5,
//! };
//!
//! // Create a job and open the destination
//! let mut job = create_job(config)?;
//! let mut target = connect(&job.config.destination)?;
//! target.check()?;
//!
//! // Plan the job (enumerate the source, predict the copy count)
//! plan_job(&mut job, target.as_mut())?;
//! if let Some(plan) = &job.plan {
//!     println!("Will copy {} files", plan.to_copy);
//! }
//!
//! // Run the job (classify live and transfer)
//! let summary = run_job(&mut job, target.as_mut(), None, None)?;
//! println!(
//!     "{} copied, {} skipped, {} failed",
//!     summary.copied, summary.skipped, summary.failed
//! );
//! target.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (ImportJob, SourceFile, enums)
//! - **error**: Error types and handling
//! - **scan**: Source tree enumeration
//! - **layout**: Date-folder destination layout
//! - **fingerprint**: Duplicate classification
//! - **target**: Destination capability interface
//! - **local**: Local-archive destination
//! - **remote**: SSH destination
//! - **job**: Run orchestration (create, plan, run)
//! - **progress**: Progress callback traits
//! - **checksums**: Checksum computation

pub mod model;
pub mod error;
pub mod scan;
pub mod layout;
pub mod fingerprint;
pub mod target;
pub mod local;
pub mod remote;
pub mod job;
pub mod progress;
pub mod checksums;

// Re-export main types and functions
pub use model::{
    Comparison, DestFingerprint, DestinationSpec, ImportConfig, ImportJob, ImportPlan, JobState,
    RemoteConfig, RunSummary, SourceFile, TransferFailure, TransferOutcome,
};
pub use error::EngineError;
pub use job::{create_job, plan_job, run_job};
pub use progress::{ImportObserver, ProgressSink};
pub use target::{connect, DestinationTarget};
pub use checksums::{compute_file_checksum, ChecksumAlgorithm, ChecksumValue};
