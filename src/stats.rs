//! Pass statistics.
//!
//! [`SyncStats`] is the raw counter snapshot; [`StatsAggregator`] is the
//! shared, mutex-guarded handle every copy worker updates. Updates are
//! accumulates, not replaces, so concurrent workers never lose counts.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

/// Cumulative counters for one sync pass.
///
/// Reset at the start of each pass, finalized at completion. Exposed to
/// callers only as a read-only snapshot via [`StatsAggregator::snapshot`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStats {
    /// Number of files copied so far
    pub files_copied: u64,
    /// Total bytes copied so far
    pub bytes_copied: u64,
    /// Basename of the last file touched
    pub current_file: String,
    /// When the pass started
    pub start_time: Option<SystemTime>,
    /// Completion timestamp of the most recent pass
    pub last_sync: Option<SystemTime>,
}

impl SyncStats {
    /// Elapsed seconds between the pass start and `last_sync` (or now if the
    /// pass is still running). Zero when the pass never started.
    pub fn duration_secs(&self) -> f64 {
        let Some(start) = self.start_time else {
            return 0.0;
        };
        let end = self.last_sync.unwrap_or_else(SystemTime::now);
        end.duration_since(start)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// Shared statistics handle.
///
/// Cloning is cheap; all clones point at the same counters.
#[derive(Debug, Clone, Default)]
pub struct StatsAggregator {
    inner: Arc<Mutex<SyncStats>>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero the counters and record the pass start time.
    pub fn reset(&self) {
        let mut stats = self.lock();
        stats.files_copied = 0;
        stats.bytes_copied = 0;
        stats.current_file.clear();
        stats.start_time = Some(SystemTime::now());
        stats.last_sync = None;
    }

    /// Accumulate deltas from a worker. Safe for concurrent callers.
    pub fn update(&self, bytes: u64, files: u64, current_file: &str) {
        let mut stats = self.lock();
        stats.bytes_copied += bytes;
        stats.files_copied += files;
        stats.current_file = current_file.to_owned();
    }

    /// Record the completion timestamp of the pass.
    pub fn complete(&self) {
        self.lock().last_sync = Some(SystemTime::now());
    }

    /// Read-only snapshot of the current counters.
    pub fn snapshot(&self) -> SyncStats {
        self.lock().clone()
    }

    /// One-line human-readable pass summary.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        let duration = stats.duration_secs();
        format!(
            "{} files copied, {} in {:.1}s ({})",
            stats.files_copied,
            format_size(stats.bytes_copied),
            duration,
            format_speed(stats.bytes_copied, duration),
        )
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SyncStats> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Render a byte count with binary multiples and one decimal place.
///
/// Units step by 1024: B, KB, MB, GB, TB, PB.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} PB")
}

/// Render an average transfer speed, `"0 B/s"` when elapsed time is zero or
/// negative.
pub fn format_speed(bytes: u64, elapsed_secs: f64) -> String {
    if elapsed_secs <= 0.0 {
        return "0 B/s".into();
    }
    let per_second = (bytes as f64 / elapsed_secs) as u64;
    format!("{}/s", format_size(per_second))
}
