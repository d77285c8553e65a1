//! Pre-overwrite backups with retention.
//!
//! Before a target file is overwritten, its current bytes and metadata are
//! copied into a `backups` subdirectory beside it, named
//! `<original-filename>.bak.<unix-epoch-seconds>`. That on-disk layout is
//! observable and must stay stable for interoperability with existing
//! backup directories.
//!
//! After each backup the manager prunes: all backups for that exact
//! filename, oldest first by creation time, down to the retention count.
//! Neither a failed backup nor a failed prune ever aborts the sync pass.

use crate::config::SyncConfig;
use crate::error::{Result, classify_io};
use crate::sink::NotificationSink;
use crate::stats::format_size;
use filetime::FileTime;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Name of the per-directory backup subdirectory.
const BACKUP_DIR: &str = "backups";

/// Creates and prunes timestamped backups of about-to-be-overwritten files.
pub struct BackupManager {
    enabled: bool,
    max_backups: usize,
    notifier: Arc<dyn NotificationSink>,
}

impl BackupManager {
    pub fn new(enabled: bool, max_backups: usize, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            enabled,
            max_backups: max_backups.max(1),
            notifier,
        }
    }

    pub fn from_config(config: &SyncConfig, notifier: Arc<dyn NotificationSink>) -> Self {
        Self::new(config.backup_enabled, config.max_backups, notifier)
    }

    /// Back up `target` if backups are enabled and the file exists.
    ///
    /// Returns the backup path on success. A backup failure is logged and
    /// reported through the notification sink, then swallowed: the overwrite
    /// proceeds without a backup rather than stalling the pass.
    pub fn backup(&self, target: &Path) -> Option<PathBuf> {
        if !self.enabled || !target.is_file() {
            return None;
        }
        match self.create_backup(target) {
            Ok(backup_path) => {
                info!("created backup {}", backup_path.display());
                self.prune(target);
                Some(backup_path)
            }
            Err(e) => {
                warn!("backup failed for {}: {e}", target.display());
                let mut details = BTreeMap::new();
                details.insert("file".into(), target.display().to_string());
                details.insert("category".into(), "backup".into());
                self.notifier
                    .error(&format!("backup failed for {}: {e}", target.display()), &details);
                None
            }
        }
    }

    fn create_backup(&self, target: &Path) -> Result<PathBuf> {
        let parent = target.parent().unwrap_or(Path::new("."));
        let backup_dir = parent.join(BACKUP_DIR);
        fs::create_dir_all(&backup_dir).map_err(|e| classify_io(&backup_dir, e))?;

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let backup_path = backup_dir.join(format!("{file_name}.bak.{timestamp}"));

        let meta = fs::metadata(target).map_err(|e| classify_io(target, e))?;
        fs::copy(target, &backup_path).map_err(|e| classify_io(target, e))?;
        debug!(
            "backed up {} ({}) to {}",
            target.display(),
            format_size(meta.len()),
            backup_path.display()
        );

        // fs::copy carries permission bits; timestamps need an explicit pass
        let mtime = FileTime::from_last_modification_time(&meta);
        let atime = FileTime::from_last_access_time(&meta);
        if let Err(e) = filetime::set_file_times(&backup_path, atime, mtime) {
            warn!("could not set backup timestamps on {}: {e}", backup_path.display());
        }

        Ok(backup_path)
    }

    /// Delete all but the newest `max_backups` backups of `target`, oldest
    /// first by creation time. Every failure here is logged and swallowed.
    fn prune(&self, target: &Path) {
        let Some(file_name) = target.file_name().map(|n| n.to_string_lossy().into_owned())
        else {
            return;
        };
        let backup_dir = target.parent().unwrap_or(Path::new(".")).join(BACKUP_DIR);
        let prefix = format!("{file_name}.bak.");

        let reader = match fs::read_dir(&backup_dir) {
            Ok(reader) => reader,
            Err(e) => {
                warn!("backup pruning failed for {}: {e}", backup_dir.display());
                return;
            }
        };

        let mut backups: Vec<(SystemTime, PathBuf)> = reader
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if !name.starts_with(&prefix) {
                    return None;
                }
                let meta = entry.metadata().ok()?;
                let created = meta.created().or_else(|_| meta.modified()).ok()?;
                Some((created, entry.path()))
            })
            .collect();

        if backups.len() <= self.max_backups {
            return;
        }
        backups.sort_by_key(|(created, _)| *created);

        let excess = backups.len() - self.max_backups;
        for (_, old_backup) in backups.into_iter().take(excess) {
            match fs::remove_file(&old_backup) {
                Ok(()) => debug!("pruned old backup {}", old_backup.display()),
                Err(e) => warn!("could not prune {}: {e}", old_backup.display()),
            }
        }
    }
}
