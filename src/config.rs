//! Sync configuration.
//!
//! [`SyncConfig`] carries the engine tunables. The engine treats a config as
//! immutable while a pass is running; it is only swapped between passes via
//! [`SyncEngine::set_config`](crate::SyncEngine::set_config).
//!
//! The on-disk configuration format is owned by the caller: the struct
//! derives serde traits so an external provider can deserialize it from
//! whatever format it uses, then hand it over after [`SyncConfig::validate`].
//!
//! # Example
//!
//! ```
//! use mirrorsync::SyncConfig;
//!
//! let config = SyncConfig::default()
//!     .with_file_patterns("*.csv,*.json")
//!     .with_exclude_patterns("*.tmp")
//!     .with_max_threads(8)
//!     .with_backups(3);
//! assert!(config.validate().is_ok());
//! ```

use crate::error::{Error, Result};

/// Tunables for the sync engine.
///
/// Pattern fields are comma-separated shell-glob lists matched against bare
/// file or directory names (`*`, `?`, `[...]`, case-sensitive). Whitespace
/// around each pattern is trimmed.
///
/// # Default Values
///
/// | Field | Default |
/// |-------|---------|
/// | `check_interval` | 10 s |
/// | `file_patterns` | `*` |
/// | `folder_patterns` | `*` |
/// | `exclude_patterns` | `*.tmp` |
/// | `backup_enabled` | `false` |
/// | `max_backups` | 5 |
/// | `max_threads` | 4 |
/// | `date_filter_enabled` | `false` |
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds to wait between passes (>= 1)
    pub check_interval: u64,

    /// Comma-separated globs a file name must match to be a candidate
    pub file_patterns: String,

    /// Comma-separated globs a directory name must match to be descended into
    ///
    /// Directories that do not match are pruned entirely; their subtrees are
    /// never visited.
    pub folder_patterns: String,

    /// Comma-separated globs that drop a file even when it is included
    ///
    /// Exclusion is evaluated after inclusion and always wins.
    pub exclude_patterns: String,

    /// Copy an existing target file into a timestamped backup before overwrite
    pub backup_enabled: bool,

    /// Backups retained per original file name (>= 1, oldest pruned first)
    pub max_backups: usize,

    /// Worker pool size for concurrent file copies (>= 1)
    pub max_threads: usize,

    /// Enable the modification-time date-range filter
    pub date_filter_enabled: bool,

    /// Inclusive lower bound, `YYYY-MM-DD`; files modified strictly before
    /// start-of-day are skipped
    pub start_date: Option<String>,

    /// Inclusive upper bound, `YYYY-MM-DD`; files modified strictly after
    /// 23:59:59.999999 of that day are skipped
    pub end_date: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            check_interval: 10,
            file_patterns: "*".into(),
            folder_patterns: "*".into(),
            exclude_patterns: "*.tmp".into(),
            backup_enabled: false,
            max_backups: 5,
            max_threads: 4,
            date_filter_enabled: false,
            start_date: None,
            end_date: None,
        }
    }
}

impl SyncConfig {
    /// Set the inter-pass interval in seconds.
    #[must_use]
    pub fn with_check_interval(mut self, seconds: u64) -> Self {
        self.check_interval = seconds;
        self
    }

    /// Set the file inclusion pattern list.
    #[must_use]
    pub fn with_file_patterns(mut self, patterns: impl Into<String>) -> Self {
        self.file_patterns = patterns.into();
        self
    }

    /// Set the directory pruning pattern list.
    #[must_use]
    pub fn with_folder_patterns(mut self, patterns: impl Into<String>) -> Self {
        self.folder_patterns = patterns.into();
        self
    }

    /// Set the file exclusion pattern list.
    #[must_use]
    pub fn with_exclude_patterns(mut self, patterns: impl Into<String>) -> Self {
        self.exclude_patterns = patterns.into();
        self
    }

    /// Enable pre-overwrite backups with the given retention count.
    #[must_use]
    pub fn with_backups(mut self, max_backups: usize) -> Self {
        self.backup_enabled = true;
        self.max_backups = max_backups.max(1);
        self
    }

    /// Set the worker pool size.
    ///
    /// Value is clamped to at least 1.
    #[must_use]
    pub fn with_max_threads(mut self, n: usize) -> Self {
        self.max_threads = n.max(1);
        self
    }

    /// Enable the date-range filter with optional bounds.
    #[must_use]
    pub fn with_date_filter(mut self, start: Option<String>, end: Option<String>) -> Self {
        self.date_filter_enabled = true;
        self.start_date = start;
        self.end_date = end;
        self
    }

    /// Check the configuration invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when `check_interval`, `max_threads`, or
    /// `max_backups` is zero, or when a pattern list is empty. Date strings
    /// are not checked here; a malformed date is handled (and logged) by the
    /// change detector as "no constraint on that bound".
    pub fn validate(&self) -> Result<()> {
        if self.check_interval < 1 {
            return Err(Error::Config("check_interval must be at least 1".into()));
        }
        if self.max_threads < 1 {
            return Err(Error::Config("max_threads must be at least 1".into()));
        }
        if self.max_backups < 1 {
            return Err(Error::Config("max_backups must be at least 1".into()));
        }
        if self.file_patterns.trim().is_empty() {
            return Err(Error::Config("file_patterns must not be empty".into()));
        }
        if self.folder_patterns.trim().is_empty() {
            return Err(Error::Config("folder_patterns must not be empty".into()));
        }
        if self.exclude_patterns.trim().is_empty() {
            return Err(Error::Config("exclude_patterns must not be empty".into()));
        }
        Ok(())
    }
}
