//! # mirrorsync
//!
//! Continuous one-way directory mirroring for Rust.
//!
//! ## Core Features
//!
//! - **Continuous loop**: Scans and mirrors on a fixed interval until stopped
//! - **Pattern filters**: Comma-separated shell globs for files, directories, and exclusions
//! - **Change detection**: Copies only files that are missing or strictly newer at the target
//! - **Date-range filter**: Optionally restrict copies to a modification-time window
//! - **Pre-overwrite backups**: Timestamped backups with per-file retention
//! - **Parallel copying**: Uses rayon for concurrent file copies
//! - **Chunked transfers**: Large files stream in 1 MiB chunks with progress reporting
//! - **Cooperative cancellation**: Stops at chunk boundaries, never mid-write block
//! - **Permission and timestamp preserving**: Copies file modes and modification times
//! - **Pluggable sinks**: Progress and error events go through traits, not a fixed UI
//!
//! ## Quick Start
//!
//! ```no_run
//! use mirrorsync::{SyncConfig, SyncEngine};
//!
//! let config = SyncConfig::default()
//!     .with_check_interval(30)
//!     .with_file_patterns("*.csv,*.json")
//!     .with_backups(5);
//!
//! let mut engine = SyncEngine::new("/srv/data", "/mnt/mirror", config);
//! engine.start()?;
//! // ... the loop now mirrors every 30 seconds ...
//! engine.stop()?;
//! # Ok::<(), mirrorsync::Error>(())
//! ```
//!
//! ### One-shot Mirror
//!
//! ```no_run
//! use mirrorsync::{SyncConfig, SyncEngine};
//!
//! let engine = SyncEngine::new("/srv/data", "/mnt/mirror", SyncConfig::default());
//! let stats = engine.run_once()?;
//! println!("{} files, {} bytes", stats.files_copied, stats.bytes_copied);
//! # Ok::<(), mirrorsync::Error>(())
//! ```
//!
//! ## What It Does Not Do
//!
//! Mirroring is one-way and additive: files deleted at the source are left
//! in place at the target, and nothing at the target is ever removed except
//! pruned backups. There is no conflict resolution because the source is
//! always authoritative.
//!
//! ## Cancellation Semantics
//!
//! A stop request is observed at directory, file, and chunk boundaries. A
//! large file cancelled mid-copy keeps its partial destination bytes; the
//! source's newer modification time makes the next pass re-copy it from the
//! start. Cancellation is reported to callers as [`Error::Interrupted`] but
//! never through a [`NotificationSink`].

mod backup;
mod config;
mod copy;
mod engine;
mod error;
mod filter;
mod scanner;
mod sink;
mod stats;

pub use backup::BackupManager;
pub use config::SyncConfig;
pub use copy::{CHUNK_SIZE, CopyExecutor, PassOutcome};
pub use engine::{RunState, SyncEngine};
pub use error::{Error, Result};
pub use filter::PatternFilter;
pub use scanner::{ChangeDetector, FileTask, TreeScanner, needs_update};
pub use sink::{LogSink, NotificationSink, NullSink, StatusSink};
pub use stats::{StatsAggregator, SyncStats, format_size, format_speed};
