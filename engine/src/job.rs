//! Run orchestration.
//!
//! This module provides the main job lifecycle functions:
//! - Creating a job from an import configuration
//! - Planning a job (enumerating the source, predicting the copy count)
//! - Running a job (classifying live and transferring)
//!
//! Per-file errors never escape the run loop; they become `Failed` entries
//! in the summary and the loop moves on to the next file.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::fingerprint;
use crate::layout;
use crate::model::{
    ImportConfig, ImportJob, ImportPlan, JobState, RunSummary, SourceFile, TransferFailure,
    TransferOutcome,
};
use crate::progress::ImportObserver;
use crate::scan;
use crate::target::DestinationTarget;

/// True once the shared interrupt flag has been raised.
///
/// The driver checks it between files; the targets check it between blocks
/// so an in-flight transfer is abandoned promptly.
pub fn cancel_requested(cancel: Option<&AtomicBool>) -> bool {
    cancel
        .map(|flag| flag.load(Ordering::Relaxed))
        .unwrap_or(false)
}

/// Create a new import job.
///
/// Validates that the source root exists and is a directory. The
/// destination side is not touched here; that is the target's preflight
/// check.
///
/// # Errors
/// Returns `SourceMissing` or `NotADirectory` for a bad source root; both
/// are setup failures that abort before enumeration.
pub fn create_job(config: ImportConfig) -> Result<ImportJob, EngineError> {
    match std::fs::metadata(&config.source_root) {
        Ok(metadata) => {
            if !metadata.is_dir() {
                return Err(EngineError::NotADirectory {
                    path: config.source_root.clone(),
                });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(EngineError::SourceMissing {
                path: config.source_root.clone(),
            });
        }
        Err(e) => {
            return Err(EngineError::Read {
                path: config.source_root.clone(),
                source: e,
            });
        }
    }

    Ok(ImportJob {
        id: Uuid::new_v4(),
        config,
        files: Vec::new(),
        plan: None,
        state: JobState::Pending,
        created_at: SystemTime::now(),
        start_time: None,
        end_time: None,
    })
}

/// Plan a job: enumerate the source tree and predict the copy count.
///
/// The dry pass resolves and classifies every file against the destination
/// without hashing and without transferring, so it stays cheap on both
/// modes. The resulting count is user-facing context only; the real pass
/// re-evaluates each file live, so staleness between the passes is
/// acceptable.
pub fn plan_job(
    job: &mut ImportJob,
    target: &mut dyn DestinationTarget,
) -> Result<(), EngineError> {
    if job.state != JobState::Pending {
        return Err(EngineError::InvalidState {
            reason: format!(
                "must be pending to plan; current state: {:?}",
                job.state
            ),
        });
    }

    job.files = scan::enumerate_source(&job.config.source_root);

    let mut actions = Vec::with_capacity(job.files.len());
    let mut to_copy = 0usize;
    let mut to_copy_bytes = 0u64;

    for file in &job.files {
        let rel = layout::relative_dest(file);
        let dest = target.stat(&rel);
        let action = fingerprint::classify_metadata(file, dest.as_ref());
        if action.needs_copy() {
            to_copy += 1;
            to_copy_bytes += file.size;
        }
        actions.push(action);
    }

    info!(
        "job {}: planned {} files, {} expected to copy ({} bytes)",
        job.id,
        job.files.len(),
        to_copy,
        to_copy_bytes
    );

    job.plan = Some(ImportPlan {
        actions,
        to_copy,
        to_copy_bytes,
    });
    Ok(())
}

fn fail_file(summary: &mut RunSummary, file: &SourceFile, reason: String) -> TransferOutcome {
    summary.failed += 1;
    summary.failures.push(TransferFailure {
        file_name: file.file_name.to_string_lossy().into_owned(),
        reason: reason.clone(),
    });
    TransferOutcome::Failed(reason)
}

/// Run a job: classify each file live and transfer where needed.
///
/// Requires a prior `plan_job`. State per file moves Discovered ->
/// Classified -> Skipped|Copied|Failed, never revisiting. Individual file
/// errors are contained and counted; the only errors that propagate out
/// are `Cancelled` and the not-planned state error.
pub fn run_job(
    job: &mut ImportJob,
    target: &mut dyn DestinationTarget,
    mut observer: Option<&mut dyn ImportObserver>,
    cancel: Option<&AtomicBool>,
) -> Result<RunSummary, EngineError> {
    if job.state != JobState::Pending {
        return Err(EngineError::InvalidState {
            reason: format!("must be pending to run; current state: {:?}", job.state),
        });
    }
    if job.plan.is_none() {
        return Err(EngineError::InvalidState {
            reason: "run requested before planning".to_string(),
        });
    }

    job.state = JobState::Running;
    job.start_time = Some(SystemTime::now());

    if let Some(cb) = observer.as_deref_mut() {
        cb.on_run_started(job);
    }

    let total = job.files.len();
    let mut summary = RunSummary::default();

    for index in 0..total {
        if cancel_requested(cancel) {
            info!(
                "job {}: cancelled after {} of {} files",
                job.id,
                summary.total_processed(),
                total
            );
            return Err(EngineError::Cancelled);
        }

        let file = &job.files[index];
        if let Some(cb) = observer.as_deref_mut() {
            cb.on_file_started(index, total, file);
        }

        let rel = layout::relative_dest(file);
        let dest = target.stat(&rel);
        let classification =
            fingerprint::classify(file, dest.as_ref(), &rel, target, job.config.algorithm);
        debug!("{}: {}", file.file_name.to_string_lossy(), classification);

        if !classification.needs_copy() {
            summary.skipped += 1;
            if let Some(cb) = observer.as_deref_mut() {
                cb.on_file_completed(index, file, &TransferOutcome::Skipped);
            }
            continue;
        }

        // The date directory goes in right before the write. A directory
        // failure fails this file only.
        if let Some(date_dir) = rel.parent() {
            if let Err(e) = target.ensure_dir(date_dir) {
                warn!("{}: {}", file.file_name.to_string_lossy(), e);
                let outcome = fail_file(&mut summary, file, e.to_string());
                if let Some(cb) = observer.as_deref_mut() {
                    cb.on_file_completed(index, file, &outcome);
                }
                continue;
            }
        }

        let mut progress = |done: u64, total_bytes: u64| {
            if let Some(cb) = observer.as_deref_mut() {
                cb.on_file_progress(file, done, total_bytes);
            }
        };
        let outcome = match target.transfer(file, &rel, &mut progress, cancel) {
            Ok(bytes) => {
                summary.copied += 1;
                summary.bytes_copied += bytes;
                TransferOutcome::Copied
            }
            Err(EngineError::Cancelled) => {
                // In-flight file abandoned; its partial stays for the next
                // run to reclassify.
                info!(
                    "job {}: cancelled while copying {}",
                    job.id,
                    file.file_name.to_string_lossy()
                );
                return Err(EngineError::Cancelled);
            }
            Err(e) => {
                warn!(
                    "failed to copy {} to {}: {}",
                    file.file_name.to_string_lossy(),
                    target.describe(&rel),
                    e
                );
                fail_file(&mut summary, file, e.to_string())
            }
        };

        if let Some(cb) = observer.as_deref_mut() {
            cb.on_file_completed(index, file, &outcome);
        }
    }

    job.state = JobState::Completed;
    job.end_time = Some(SystemTime::now());

    info!(
        "job {}: complete, {} copied, {} skipped, {} failed",
        job.id,
        summary.copied,
        summary.skipped,
        summary.failed
    );

    if let Some(cb) = observer.as_deref_mut() {
        cb.on_run_completed(job, &summary);
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksums::ChecksumAlgorithm;
    use crate::local::LocalTarget;
    use crate::model::DestinationSpec;
    use filetime::FileTime;
    use std::fs;
    use std::path::Path;

    fn local_config(src: &Path, base: &Path) -> ImportConfig {
        ImportConfig {
            source_root: src.to_path_buf(),
            destination: DestinationSpec::Local {
                base: base.to_path_buf(),
            },
            algorithm: ChecksumAlgorithm::Md5,
        }
    }

    fn planned_job(src: &Path, base: &Path, target: &mut LocalTarget) -> ImportJob {
        let mut job = create_job(local_config(src, base)).expect("Failed to create job");
        plan_job(&mut job, target).expect("Failed to plan job");
        job
    }

    #[test]
    fn test_create_job_with_valid_source() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir(&src).expect("Failed to create src dir");

        let job = create_job(local_config(&src, &temp_dir.path().join("dst")))
            .expect("Failed to create job");

        assert_eq!(job.state, JobState::Pending);
        assert!(job.files.is_empty());
        assert!(job.plan.is_none());
    }

    #[test]
    fn test_create_job_with_missing_source() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("nonexistent");

        let result = create_job(local_config(&src, &temp_dir.path().join("dst")));
        assert!(matches!(result, Err(EngineError::SourceMissing { .. })));
    }

    #[test]
    fn test_create_job_with_file_as_source() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("file.txt");
        fs::File::create(&src).expect("Failed to create file");

        let result = create_job(local_config(&src, &temp_dir.path().join("dst")));
        assert!(matches!(result, Err(EngineError::NotADirectory { .. })));
    }

    #[test]
    fn test_plan_counts_expected_copies() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir(&src).expect("Failed to create src dir");
        fs::write(src.join("a.jpg"), b"aaaa").expect("Failed to write a.jpg");
        fs::write(src.join("b.jpg"), b"bbbbbb").expect("Failed to write b.jpg");

        let base = temp_dir.path().join("archive");
        let mut target = LocalTarget::new(base.clone());

        let job = planned_job(&src, &base, &mut target);
        let plan = job.plan.as_ref().expect("plan was stored");

        assert_eq!(job.files.len(), 2);
        assert_eq!(plan.to_copy, 2);
        assert_eq!(plan.to_copy_bytes, 10);
    }

    #[test]
    fn test_run_requires_plan() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir(&src).expect("Failed to create src dir");

        let base = temp_dir.path().join("archive");
        let mut target = LocalTarget::new(base.clone());
        let mut job = create_job(local_config(&src, &base)).expect("Failed to create job");

        let result = run_job(&mut job, &mut target, None, None);
        assert!(matches!(result, Err(EngineError::InvalidState { .. })));
    }

    #[test]
    fn test_run_copies_into_date_folders() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir(&src).expect("Failed to create src dir");
        fs::write(src.join("IMG_0001.JPG"), b"first").expect("Failed to write file");
        fs::write(src.join("IMG_0002.JPG"), b"second").expect("Failed to write file");

        let base = temp_dir.path().join("archive");
        let mut target = LocalTarget::new(base.clone());
        let mut job = planned_job(&src, &base, &mut target);

        let summary =
            run_job(&mut job, &mut target, None, None).expect("Run should complete");

        assert_eq!(summary.copied, 2);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.bytes_copied, 11);
        assert_eq!(job.state, JobState::Completed);

        for file in &job.files {
            let dest = base.join(layout::relative_dest(file));
            assert!(dest.exists(), "{} should exist", dest.display());
        }
    }

    #[test]
    fn test_second_run_skips_everything() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir(&src).expect("Failed to create src dir");
        fs::write(src.join("a.jpg"), b"aaaa").expect("Failed to write a.jpg");
        fs::write(src.join("b.jpg"), b"bb").expect("Failed to write b.jpg");

        let base = temp_dir.path().join("archive");
        let mut target = LocalTarget::new(base.clone());

        let mut first = planned_job(&src, &base, &mut target);
        let summary =
            run_job(&mut first, &mut target, None, None).expect("First run should complete");
        assert_eq!(summary.copied, 2);

        let mut second = planned_job(&src, &base, &mut target);
        let plan = second.plan.as_ref().expect("plan was stored");
        assert_eq!(plan.to_copy, 0, "second plan should predict no copies");

        let summary =
            run_job(&mut second, &mut target, None, None).expect("Second run should complete");
        assert_eq!(summary.copied, 0);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.failed, 0);
    }

    #[test]
    fn test_partial_failure_is_isolated() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir(&src).expect("Failed to create src dir");
        for name in ["a.bin", "b.bin", "c.bin", "d.bin", "e.bin"] {
            fs::write(src.join(name), b"payload").expect("Failed to write source file");
        }

        let base = temp_dir.path().join("archive");
        let mut target = LocalTarget::new(base.clone());
        let mut job = planned_job(&src, &base, &mut target);

        // Block the third file's destination with a directory of the same
        // name; its create fails while every other file goes through.
        let blocked = base.join(layout::relative_dest(&job.files[2]));
        fs::create_dir_all(&blocked).expect("Failed to plant blocking dir");

        let summary = run_job(&mut job, &mut target, None, None).expect("Run should complete");

        assert_eq!(summary.copied, 4);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].file_name, "c.bin");

        for (i, file) in job.files.iter().enumerate() {
            if i == 2 {
                continue;
            }
            let dest = base.join(layout::relative_dest(file));
            assert!(dest.is_file(), "{} should have been copied", dest.display());
        }
    }

    #[test]
    fn test_retry_heals_partial_artifact() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir(&src).expect("Failed to create src dir");
        fs::write(src.join("clip.mov"), b"full original content").expect("Failed to write source");

        let base = temp_dir.path().join("archive");
        let mut target = LocalTarget::new(base.clone());

        let mut first = planned_job(&src, &base, &mut target);
        run_job(&mut first, &mut target, None, None).expect("First run should complete");

        // Simulate an aborted transfer: truncated content, mtime not
        // matching the source.
        let dest = base.join(layout::relative_dest(&first.files[0]));
        fs::write(&dest, b"full orig").expect("Failed to truncate dest");
        filetime::set_file_mtime(&dest, FileTime::from_unix_time(1_500_000_000, 0))
            .expect("Failed to set dest mtime");

        let mut second = planned_job(&src, &base, &mut target);
        let plan = second.plan.as_ref().expect("plan was stored");
        assert_eq!(plan.to_copy, 1, "partial should be planned as a copy");

        let summary =
            run_job(&mut second, &mut target, None, None).expect("Second run should complete");
        assert_eq!(summary.copied, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(
            fs::read(&dest).expect("Failed to read healed dest"),
            b"full original content"
        );
    }

    #[test]
    fn test_zero_byte_file_is_copied() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir(&src).expect("Failed to create src dir");
        fs::write(src.join("empty.bin"), b"").expect("Failed to write source");

        let base = temp_dir.path().join("archive");
        let mut target = LocalTarget::new(base.clone());
        let mut job = planned_job(&src, &base, &mut target);

        let summary = run_job(&mut job, &mut target, None, None).expect("Run should complete");

        assert_eq!(summary.copied, 1);
        let dest = base.join(layout::relative_dest(&job.files[0]));
        assert_eq!(
            fs::metadata(&dest).expect("Failed to stat dest").len(),
            0,
            "zero-byte file should exist at the destination"
        );
    }

    #[test]
    fn test_hidden_files_never_counted() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir(&src).expect("Failed to create src dir");
        fs::write(src.join(".DS_Store"), b"junk").expect("Failed to write hidden file");
        fs::write(src.join("IMG_0001.JPG"), b"photo").expect("Failed to write file");

        let base = temp_dir.path().join("archive");
        let mut target = LocalTarget::new(base.clone());
        let mut job = planned_job(&src, &base, &mut target);

        assert_eq!(job.files.len(), 1);

        let summary = run_job(&mut job, &mut target, None, None).expect("Run should complete");
        assert_eq!(summary.total_processed(), 1);
        assert_eq!(summary.copied, 1);
    }

    #[test]
    fn test_cancel_before_first_file() {
        use std::sync::atomic::AtomicBool;

        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir(&src).expect("Failed to create src dir");
        fs::write(src.join("a.jpg"), b"data").expect("Failed to write source");

        let base = temp_dir.path().join("archive");
        let mut target = LocalTarget::new(base.clone());
        let mut job = planned_job(&src, &base, &mut target);

        let cancel = AtomicBool::new(true);
        let result = run_job(&mut job, &mut target, None, Some(&cancel));

        assert!(matches!(result, Err(EngineError::Cancelled)));
        assert!(
            !base.join(layout::relative_dest(&job.files[0])).exists(),
            "nothing should have been copied"
        );
    }

    struct TestObserver {
        calls: Vec<String>,
    }

    impl TestObserver {
        fn new() -> Self {
            TestObserver { calls: Vec::new() }
        }
    }

    impl ImportObserver for TestObserver {
        fn on_run_started(&mut self, _job: &ImportJob) {
            self.calls.push("run_started".to_string());
        }

        fn on_file_started(&mut self, index: usize, _total: usize, _file: &SourceFile) {
            self.calls.push(format!("file_started({})", index));
        }

        fn on_file_progress(&mut self, _file: &SourceFile, done: u64, total: u64) {
            self.calls.push(format!("progress({}/{})", done, total));
        }

        fn on_file_completed(&mut self, index: usize, _file: &SourceFile, outcome: &TransferOutcome) {
            self.calls.push(format!("file_completed({}, {})", index, outcome));
        }

        fn on_run_completed(&mut self, _job: &ImportJob, summary: &RunSummary) {
            self.calls.push(format!("run_completed({})", summary.copied));
        }
    }

    #[test]
    fn test_observer_sees_lifecycle_in_order() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir(&src).expect("Failed to create src dir");
        fs::write(src.join("a.jpg"), b"abcdef").expect("Failed to write source");

        let base = temp_dir.path().join("archive");
        let mut target = LocalTarget::new(base.clone());
        let mut job = planned_job(&src, &base, &mut target);

        let mut observer = TestObserver::new();
        run_job(&mut job, &mut target, Some(&mut observer), None)
            .expect("Run should complete");

        assert_eq!(observer.calls.first().map(String::as_str), Some("run_started"));
        assert_eq!(
            observer.calls.last().map(String::as_str),
            Some("run_completed(1)")
        );
        assert!(observer.calls.contains(&"file_started(0)".to_string()));
        assert!(observer.calls.contains(&"progress(6/6)".to_string()));
        assert!(observer
            .calls
            .contains(&"file_completed(0, copied)".to_string()));
    }

    #[test]
    fn test_plan_handles_empty_source() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir(&src).expect("Failed to create src dir");

        let base = temp_dir.path().join("archive");
        let mut target = LocalTarget::new(base.clone());
        let mut job = planned_job(&src, &base, &mut target);

        let plan = job.plan.as_ref().expect("plan was stored");
        assert_eq!(plan.to_copy, 0);

        let summary = run_job(&mut job, &mut target, None, None).expect("Run should complete");
        assert_eq!(summary.total_processed(), 0);
    }

    #[test]
    fn test_nested_source_lands_flat() {
        // Files in subdirectories still land flat under their date folder.
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir_all(src.join("DCIM/100CANON")).expect("Failed to create tree");
        fs::write(src.join("DCIM/100CANON/IMG_0001.CR3"), b"raw").expect("Failed to write file");

        let base = temp_dir.path().join("archive");
        let mut target = LocalTarget::new(base.clone());
        let mut job = planned_job(&src, &base, &mut target);

        run_job(&mut job, &mut target, None, None).expect("Run should complete");

        let rel = layout::relative_dest(&job.files[0]);
        assert_eq!(
            rel.components().count(),
            2,
            "destination is date folder plus file name"
        );
        assert!(base.join(&rel).is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_name_survives_import() {
        use std::ffi::OsString;
        use std::os::unix::ffi::OsStringExt;

        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        fs::create_dir(&src).expect("Failed to create src dir");

        let name = OsString::from_vec(b"IMG_\xe5\x93.JPG".to_vec());
        fs::write(src.join(&name), b"photo").expect("Failed to write source file");

        let base = temp_dir.path().join("archive");
        let mut target = LocalTarget::new(base.clone());
        let mut job = planned_job(&src, &base, &mut target);

        assert_eq!(job.files.len(), 1);
        assert_eq!(job.files[0].file_name, name);

        let summary = run_job(&mut job, &mut target, None, None).expect("Run should complete");
        assert_eq!(summary.copied, 1);

        let dest = base.join(layout::relative_dest(&job.files[0]));
        assert!(dest.is_file(), "imported file keeps its exact name");
        assert_eq!(dest.file_name(), Some(name.as_os_str()));
    }
}
