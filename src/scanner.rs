//! Source tree traversal and change detection.
//!
//! [`TreeScanner`] walks the source tree depth-first and yields one
//! [`FileTask`] per file that survives the pattern filters. Directories that
//! do not match the folder patterns are pruned before descent, so their
//! subtrees (including any nested exclusions) are never visited.
//!
//! The scan is lazy, finite, and non-restartable. It checks the cancellation
//! token at every directory and file boundary and simply ends early when the
//! token is raised; a cancelled scan is partial output, not an error.
//!
//! [`ChangeDetector`] applies the optional modification-time date-range
//! filter; [`needs_update`] is the separate existence/mtime freshness check
//! applied at the scan/loop boundary. Both must pass for a copy to be
//! scheduled.

use crate::config::SyncConfig;
use crate::error::Result;
use crate::filter::PatternFilter;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, warn};

/// One file scheduled for copying.
///
/// Byte size is read lazily at copy time, not here; a file can grow or
/// shrink between scan and copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    /// Absolute path of the file under the source root
    pub source: PathBuf,
    /// Where the copy lands: source-root prefix replaced by the target root,
    /// relative path preserved exactly
    pub target: PathBuf,
}

/// Depth-first, filter-aware walk over the source tree.
pub struct TreeScanner {
    file_filter: PatternFilter,
    folder_filter: PatternFilter,
    exclude_filter: PatternFilter,
    cancel: Arc<AtomicBool>,
    pending: Vec<(PathBuf, PathBuf)>,
    current: Option<(fs::ReadDir, PathBuf, PathBuf)>,
}

impl TreeScanner {
    /// Open a scan rooted at `source`, mapping results under `target`.
    ///
    /// # Errors
    ///
    /// Failing to open the source root itself is a pass-level error.
    /// Unreadable subdirectories encountered later are logged and skipped.
    pub fn new(
        source: &Path,
        target: &Path,
        config: &SyncConfig,
        cancel: Arc<AtomicBool>,
    ) -> Result<Self> {
        let reader = fs::read_dir(source)?;
        Ok(Self {
            file_filter: PatternFilter::new(&config.file_patterns),
            folder_filter: PatternFilter::new(&config.folder_patterns),
            exclude_filter: PatternFilter::new(&config.exclude_patterns),
            cancel,
            pending: Vec::new(),
            current: Some((reader, source.to_path_buf(), target.to_path_buf())),
        })
    }

    /// Apply the filters to one directory entry. Matching subdirectories are
    /// queued for descent; matching files become tasks.
    fn process_entry(&mut self, entry: &fs::DirEntry, target_dir: &Path) -> Option<FileTask> {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(e) => {
                warn!("skipping {}: {e}", entry.path().display());
                return None;
            }
        };

        if file_type.is_dir() {
            if self.folder_filter.matches(&name) {
                self.pending.push((entry.path(), target_dir.join(&*name)));
            } else {
                debug!("pruned directory {}", entry.path().display());
            }
            return None;
        }

        // Symlinks to files are mirrored by content; directory symlinks are
        // not followed (a link back into the tree would loop forever).
        if file_type.is_symlink() {
            match fs::metadata(entry.path()) {
                Ok(meta) if meta.is_file() => {}
                Ok(_) => {
                    debug!("not following directory symlink {}", entry.path().display());
                    return None;
                }
                Err(e) => {
                    warn!("skipping broken symlink {}: {e}", entry.path().display());
                    return None;
                }
            }
        } else if !file_type.is_file() {
            debug!("skipping special file {}", entry.path().display());
            return None;
        }

        if !self.file_filter.matches(&name) {
            return None;
        }
        if self.exclude_filter.matches(&name) {
            debug!("excluded {}", entry.path().display());
            return None;
        }

        Some(FileTask {
            source: entry.path(),
            target: target_dir.join(&*name),
        })
    }
}

impl Iterator for TreeScanner {
    type Item = FileTask;

    fn next(&mut self) -> Option<FileTask> {
        loop {
            // Checkpoint at every directory and file boundary: a raised
            // token ends the scan with whatever was already yielded.
            if self.cancel.load(Ordering::Relaxed) {
                debug!("scan cancelled");
                self.current = None;
                self.pending.clear();
                return None;
            }

            let Some((mut reader, src_dir, target_dir)) = self.current.take() else {
                let (src_dir, dst_dir) = self.pending.pop()?;
                match fs::read_dir(&src_dir) {
                    Ok(next_reader) => self.current = Some((next_reader, src_dir, dst_dir)),
                    Err(e) => warn!("skipping unreadable directory {}: {e}", src_dir.display()),
                }
                continue;
            };

            match reader.next() {
                None => continue,
                Some(Err(e)) => {
                    warn!("skipping unreadable entry in {}: {e}", src_dir.display());
                    self.current = Some((reader, src_dir, target_dir));
                }
                Some(Ok(entry)) => {
                    let task = self.process_entry(&entry, &target_dir);
                    self.current = Some((reader, src_dir, target_dir));
                    if task.is_some() {
                        return task;
                    }
                }
            }
        }
    }
}

/// Whether the source file is fresh enough to warrant a copy: the target is
/// missing, or the source's modification time is strictly newer.
///
/// Unreadable modification times are treated as "copy it" so a flaky stat
/// never silently drops a file.
pub fn needs_update(source: &Path, target: &Path) -> bool {
    let Ok(target_meta) = fs::metadata(target) else {
        return true;
    };
    let (Ok(src_mtime), Ok(dst_mtime)) = (
        fs::metadata(source).and_then(|m| m.modified()),
        target_meta.modified(),
    ) else {
        return true;
    };
    src_mtime > dst_mtime
}

/// Modification-time date-range filter.
///
/// Inactive detectors accept everything. A malformed date string disables
/// that bound only; it is logged, never fatal.
#[derive(Debug, Clone, Default)]
pub struct ChangeDetector {
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
    enabled: bool,
}

impl ChangeDetector {
    pub fn from_config(config: &SyncConfig) -> Self {
        if !config.date_filter_enabled {
            return Self::default();
        }
        let start = config
            .start_date
            .as_deref()
            .and_then(|s| parse_day_bound(s, "start_date"))
            .and_then(|d| d.and_hms_opt(0, 0, 0));
        let end = config
            .end_date
            .as_deref()
            .and_then(|s| parse_day_bound(s, "end_date"))
            .and_then(|d| d.and_hms_micro_opt(23, 59, 59, 999_999));
        Self {
            start,
            end,
            enabled: true,
        }
    }

    /// Whether the file's modification time falls inside the configured
    /// range. Always true when the filter is inactive; a file whose mtime
    /// cannot be read passes (and is logged) rather than being dropped.
    pub fn should_copy(&self, path: &Path) -> bool {
        if !self.enabled {
            return true;
        }
        let mtime = match fs::metadata(path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                warn!("date check failed for {}: {e}", path.display());
                return true;
            }
        };
        let file_time = DateTime::<Local>::from(mtime).naive_local();

        if let Some(start) = self.start {
            if file_time < start {
                debug!("{} modified before start date", path.display());
                return false;
            }
        }
        if let Some(end) = self.end {
            if file_time > end {
                debug!("{} modified after end date", path.display());
                return false;
            }
        }
        true
    }
}

fn parse_day_bound(text: &str, which: &str) -> Option<NaiveDate> {
    match NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(e) => {
            error!("malformed {which} {text:?}, ignoring that bound: {e}");
            None
        }
    }
}
