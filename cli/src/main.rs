//! msync - Mirror Sync
//!
//! A continuous one-way directory mirroring command powered by mirrorsync.

use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use mirrorsync::{
    Error as SyncError, NotificationSink, StatusSink, SyncConfig, SyncEngine, SyncStats,
    format_size, format_speed,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

/// msync - Continuous one-way directory mirroring
///
/// Watches SOURCE on an interval and mirrors new or modified files into
/// TARGET. Files are never deleted from TARGET.
///
/// Usage:
///   msync SOURCE TARGET
///   msync --once SOURCE TARGET
#[derive(Parser, Debug)]
#[command(name = "msync", version, about, long_about = None)]
struct Args {
    /// Source directory (the authoritative side)
    source: PathBuf,

    /// Target directory (the mirror side)
    target: PathBuf,

    /// Seconds between sync passes
    #[arg(short = 'i', long, default_value = "10")]
    interval: u64,

    /// Comma-separated globs a file name must match to be copied
    #[arg(long, default_value = "*", value_name = "GLOBS")]
    file_patterns: String,

    /// Comma-separated globs a directory name must match to be entered
    #[arg(long, default_value = "*", value_name = "GLOBS")]
    folder_patterns: String,

    /// Comma-separated globs that drop a file even when it is included
    #[arg(short = 'x', long, default_value = "*.tmp", value_name = "GLOBS")]
    exclude: String,

    /// Back up target files into a timestamped backups/ directory before overwriting
    #[arg(short = 'b', long)]
    backup: bool,

    /// Backups kept per file name when --backup is set
    #[arg(long, default_value = "5")]
    max_backups: usize,

    /// Number of parallel copy workers
    #[arg(short = 'j', long, default_value = "4")]
    jobs: usize,

    /// Only copy files modified on or after this date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    from_date: Option<String>,

    /// Only copy files modified on or before this date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    to_date: Option<String>,

    /// Run a single pass and exit instead of looping
    #[arg(long)]
    once: bool,

    /// Output format for the final summary
    #[arg(long, value_enum, default_value = "human")]
    output: OutputMode,

    /// Disable the progress spinner
    #[arg(short = 'q', long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Sync(#[from] SyncError),

    #[error("Failed to serialize JSON output: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("Sync loop ended after a pass-level failure; see errors above")]
    LoopAborted,
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            Self::Sync(SyncError::Config(_) | SyncError::Validation(_)) => 2,
            Self::Sync(e) if e.is_interrupt() => 130,
            _ => 1,
        }
    }
}

/// Progress sink backed by an indicatif spinner.
struct SpinnerSink {
    bar: ProgressBar,
}

impl SpinnerSink {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }
}

impl StatusSink for SpinnerSink {
    fn status(&self, message: &str, _progress: Option<f64>) {
        self.bar.set_message(message.to_owned());
    }
}

/// Status sink that prints plain lines, for scripted runs.
struct PlainSink;

impl StatusSink for PlainSink {
    fn status(&self, _message: &str, _progress: Option<f64>) {}
}

/// Error events land on stderr, one block per event.
struct StderrSink {
    json: bool,
}

impl NotificationSink for StderrSink {
    fn error(&self, message: &str, details: &BTreeMap<String, String>) {
        if self.json {
            let record = json!({
                "schema_version": "1.0",
                "record_type": "error",
                "message": message,
                "details": details,
            });
            eprintln!("{record}");
        } else {
            eprintln!("error: {message}");
            for (key, value) in details {
                eprintln!("  {key}: {value}");
            }
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(error) = run() {
        let code = error.exit_code();
        if code == 130 {
            eprintln!("Cancelled: {error}");
        } else {
            eprintln!("error: {error}");
        }
        std::process::exit(code);
    }
}

fn run() -> CliResult<()> {
    let args = Args::parse();
    let config = build_config(&args);

    let status: Arc<dyn StatusSink> =
        if args.quiet || args.output == OutputMode::Json || args.once {
            Arc::new(PlainSink)
        } else {
            Arc::new(SpinnerSink::new())
        };
    let notifier: Arc<dyn NotificationSink> = Arc::new(StderrSink {
        json: args.output == OutputMode::Json,
    });

    let mut engine = SyncEngine::new(&args.source, &args.target, config)
        .with_status_sink(status)
        .with_notification_sink(notifier);

    if args.once {
        let stats = engine.run_once()?;
        report(&stats, args.output)?;
        return Ok(());
    }

    engine.start()?;

    let stop_requested = Arc::new(AtomicBool::new(false));
    {
        let flag = stop_requested.clone();
        ctrlc::set_handler(move || {
            if flag.load(Ordering::Relaxed) {
                eprintln!("\nForce quit.");
                std::process::exit(130);
            }
            flag.store(true, Ordering::Relaxed);
            eprintln!("\nStopping... in-flight copies end at their next checkpoint.");
        })
        .ok();
    }

    // Park until Ctrl+C or until the loop dies on its own (fatal pass error)
    while !stop_requested.load(Ordering::Relaxed) && engine.is_running() {
        std::thread::sleep(Duration::from_millis(200));
    }
    // Nobody asked for a stop, so the loop exited on a pass-level failure
    let loop_aborted = !stop_requested.load(Ordering::Relaxed) && !engine.is_running();

    engine.stop()?;
    report(&engine.stats(), args.output)?;
    if loop_aborted {
        return Err(CliError::LoopAborted);
    }
    Ok(())
}

fn build_config(args: &Args) -> SyncConfig {
    let mut config = SyncConfig::default()
        .with_check_interval(args.interval)
        .with_file_patterns(args.file_patterns.as_str())
        .with_folder_patterns(args.folder_patterns.as_str())
        .with_exclude_patterns(args.exclude.as_str())
        .with_max_threads(args.jobs);
    if args.backup {
        config = config.with_backups(args.max_backups);
    }
    if args.from_date.is_some() || args.to_date.is_some() {
        config = config.with_date_filter(args.from_date.clone(), args.to_date.clone());
    }
    config
}

fn report(stats: &SyncStats, mode: OutputMode) -> CliResult<()> {
    match mode {
        OutputMode::Human => {
            let duration = stats.duration_secs();
            println!(
                "{} files copied, {} in {:.1}s ({})",
                stats.files_copied,
                format_size(stats.bytes_copied),
                duration,
                format_speed(stats.bytes_copied, duration),
            );
        }
        OutputMode::Json => {
            let record = json!({
                "schema_version": "1.0",
                "record_type": "summary",
                "files_copied": stats.files_copied,
                "bytes_copied": stats.bytes_copied,
                "duration_secs": stats.duration_secs(),
            });
            println!("{}", serde_json::to_string(&record)?);
        }
    }
    Ok(())
}
