//! Offload - Command-line interface for the media import engine.
//!
//! Provides argument parsing, logging setup, Ctrl-C handling, and progress
//! reporting to stderr. The end-of-run summary can also be emitted as JSON
//! on stdout.

use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use engine::{
    job::{create_job, plan_job, run_job},
    layout::relative_dest,
    model::{DestinationSpec, ImportConfig, ImportJob, RemoteConfig, SourceFile},
    progress::ImportObserver,
    target::{connect, DestinationTarget},
    ChecksumAlgorithm, EngineError, RunSummary, TransferOutcome,
};
use tracing::warn;

/// Offload - Import camera cards into a date-partitioned archive
#[derive(Parser, Debug)]
#[command(name = "offload")]
#[command(version = "0.1.0")]
#[command(about = "Import a card or folder into a date-partitioned archive")]
struct Args {
    /// Source directory (typically a mounted card)
    #[arg(long, value_name = "PATH")]
    source: PathBuf,

    /// Archive base directory; a path on the remote host when --host is set
    #[arg(long, value_name = "PATH")]
    dest: String,

    /// Remote host; without it the destination is local
    #[arg(long, value_name = "HOST", requires = "user")]
    host: Option<String>,

    /// Remote user
    #[arg(long, value_name = "USER", requires = "host")]
    user: Option<String>,

    /// Remote SSH port
    #[arg(long, value_name = "PORT", default_value_t = 22)]
    port: u16,

    /// Private key for remote authentication (agent keys are tried first)
    #[arg(long, value_name = "KEY", requires = "host")]
    identity: Option<PathBuf>,

    /// Resume interrupted remote uploads by appending to shorter partials
    #[arg(long, requires = "host")]
    resume: bool,

    /// Checksum algorithm for the duplicate tiebreak: md5, sha256, or blake3
    #[arg(long, value_name = "ALGORITHM", default_value = "md5")]
    hash: String,

    /// Plan only: report what would be copied without transferring
    #[arg(long)]
    dry_run: bool,

    /// Print the end-of-run summary as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(long)]
    verbose: bool,
}

/// CLI implementation of ImportObserver for displaying run progress
struct ConsoleProgress {
    verbose: bool,
    start_time: Instant,
    last_progress_update: Instant,
    progress_line_open: bool,
}

impl ConsoleProgress {
    fn new(verbose: bool) -> Self {
        let now = Instant::now();
        ConsoleProgress {
            verbose,
            start_time: now,
            last_progress_update: now,
            progress_line_open: false,
        }
    }

    fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    fn format_duration(elapsed: std::time::Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }

    fn print_progress_bar(percent: u32) -> String {
        // Reported bytes can pass the recorded size when a source file
        // grows mid-run; the bar tops out at 100%.
        let percent = percent.min(100);
        let filled = (percent / 5) as usize;
        let empty = 20 - filled;
        format!(
            "[{}{}] {}%",
            "=".repeat(filled),
            " ".repeat(empty),
            percent
        )
    }
}

impl ImportObserver for ConsoleProgress {
    fn on_run_started(&mut self, job: &ImportJob) {
        eprintln!("Importing...");
        eprintln!("  Source: {}", job.config.source_root.display());
        eprintln!(
            "  Destination: {}",
            destination_label(&job.config.destination)
        );
        if let Some(plan) = &job.plan {
            eprintln!(
                "  Found {} files, expecting to copy {} ({})",
                job.files.len(),
                plan.to_copy,
                Self::format_bytes(plan.to_copy_bytes)
            );
        }
        eprintln!();
    }

    fn on_file_started(&mut self, index: usize, _total: usize, file: &SourceFile) {
        if self.verbose {
            eprintln!(
                "[{:3}] Starting: {} ({})",
                index,
                file.file_name.to_string_lossy(),
                Self::format_bytes(file.size)
            );
        }
    }

    fn on_file_progress(&mut self, file: &SourceFile, bytes_transferred: u64, total_bytes: u64) {
        // Throttle progress updates to avoid spam (max once per 200ms); the
        // final update always goes through.
        let elapsed = self.last_progress_update.elapsed();
        if elapsed.as_millis() < 200 && bytes_transferred < total_bytes {
            return;
        }
        self.last_progress_update = Instant::now();

        let total = total_bytes.max(1);
        let percent = (bytes_transferred as f64 / total as f64 * 100.0) as u32;

        eprint!(
            "\rProgress: {} {} | {}/{}",
            Self::print_progress_bar(percent),
            file.file_name.to_string_lossy(),
            Self::format_bytes(bytes_transferred),
            Self::format_bytes(total_bytes)
        );
        let _ = std::io::Write::flush(&mut std::io::stderr());
        self.progress_line_open = true;
    }

    fn on_file_completed(&mut self, index: usize, file: &SourceFile, outcome: &TransferOutcome) {
        if self.progress_line_open {
            eprintln!();
            self.progress_line_open = false;
        }
        let name = file.file_name.to_string_lossy();
        match outcome {
            TransferOutcome::Copied => eprintln!("[{:3}] Copied: {}", index, name),
            TransferOutcome::Skipped => eprintln!("[{:3}] Skipped: {}", index, name),
            TransferOutcome::Failed(reason) => {
                eprintln!("[{:3}] Failed: {} ({})", index, name, reason)
            }
        }
    }

    fn on_run_completed(&mut self, _job: &ImportJob, summary: &RunSummary) {
        eprintln!();
        eprintln!("Import complete!");
        eprintln!(
            "Summary: {} copied, {} skipped, {} failed",
            summary.copied, summary.skipped, summary.failed
        );
        eprintln!("Bytes copied: {}", Self::format_bytes(summary.bytes_copied));
        eprintln!(
            "Elapsed: {}",
            Self::format_duration(self.start_time.elapsed())
        );

        if !summary.failures.is_empty() {
            eprintln!();
            eprintln!("Failed files:");
            for failure in &summary.failures {
                eprintln!("  {}: {}", failure.file_name, failure.reason);
            }
        }
    }
}

fn destination_label(destination: &DestinationSpec) -> String {
    match destination {
        DestinationSpec::Local { base } => base.display().to_string(),
        DestinationSpec::Remote { base, host } => {
            format!("{}@{}:{}", host.user, host.host, base)
        }
    }
}

/// Route diagnostics to stderr so JSON output on stdout stays clean.
fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&cancel);
        if let Err(e) = ctrlc::set_handler(move || {
            flag.store(true, Ordering::Relaxed);
            eprintln!("\nInterrupt received, stopping...");
        }) {
            eprintln!("Error: failed to install interrupt handler: {}", e);
            std::process::exit(1);
        }
    }

    // Setup failures exit 1; a completed run exits 0 even when individual
    // files failed, and a cancelled run exits 0 as well.
    let exit_code = match run_cli(&args, &cancel) {
        Ok(()) => 0,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            1
        }
    };

    std::process::exit(exit_code);
}

/// Translate arguments into an engine configuration.
fn build_config(args: &Args) -> Result<ImportConfig, String> {
    let algorithm = match ChecksumAlgorithm::from_str(&args.hash) {
        Some(algo) => algo,
        None => {
            return Err(format!(
                "Invalid hash algorithm '{}'. Must be 'md5', 'sha256', or 'blake3'",
                args.hash
            ))
        }
    };

    let destination = match &args.host {
        Some(host) => {
            let user = match &args.user {
                Some(user) => user.clone(),
                None => return Err("--user is required with --host".to_string()),
            };
            DestinationSpec::Remote {
                base: args.dest.clone(),
                host: RemoteConfig {
                    host: host.clone(),
                    user,
                    port: args.port,
                    connect_timeout: Duration::from_secs(10),
                    identity_file: args.identity.clone(),
                    resume: args.resume,
                },
            }
        }
        None => DestinationSpec::Local {
            base: PathBuf::from(&args.dest),
        },
    };

    Ok(ImportConfig {
        source_root: args.source.clone(),
        destination,
        algorithm,
    })
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args, cancel: &AtomicBool) -> Result<(), String> {
    let config = build_config(args)?;

    let mut job = create_job(config).map_err(|e| format!("Job creation failed: {}", e))?;

    let mut target = connect(&job.config.destination)
        .map_err(|e| format!("Destination unavailable: {}", e))?;

    let result = execute(args, &mut job, target.as_mut(), cancel);

    // The destination is released on every exit path, cancellation included.
    if let Err(e) = target.close() {
        warn!("failed to close destination: {}", e);
    }

    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_cancellation() => {
            eprintln!("Import cancelled.");
            Ok(())
        }
        Err(e) => Err(format!("Import failed: {}", e)),
    }
}

fn execute(
    args: &Args,
    job: &mut ImportJob,
    target: &mut dyn DestinationTarget,
    cancel: &AtomicBool,
) -> Result<(), EngineError> {
    if args.dry_run {
        // Plan without the preflight check so a dry run leaves no trace on
        // the destination.
        plan_job(job, target)?;
        print_plan(job);
        return Ok(());
    }

    target.check()?;
    plan_job(job, target)?;

    let mut progress = ConsoleProgress::new(args.verbose);
    let summary = run_job(job, target, Some(&mut progress), Some(cancel))?;

    if args.json {
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => warn!("failed to encode summary as JSON: {}", e),
        }
    }

    Ok(())
}

/// Report the planning pass without transferring anything.
fn print_plan(job: &ImportJob) {
    let plan = match &job.plan {
        Some(plan) => plan,
        None => return,
    };

    for (file, action) in job.files.iter().zip(&plan.actions) {
        let verb = if action.needs_copy() { "copy" } else { "skip" };
        println!(
            "{}  {} -> {}  ({})",
            verb,
            file.file_name.to_string_lossy(),
            relative_dest(file).display(),
            ConsoleProgress::format_bytes(file.size)
        );
    }
    println!(
        "Would copy {} of {} files ({})",
        plan.to_copy,
        job.files.len(),
        ConsoleProgress::format_bytes(plan.to_copy_bytes)
    );
}
