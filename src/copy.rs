//! Chunked file copying with progress and cooperative cancellation.
//!
//! Files at or below [`CHUNK_SIZE`] are copied in one shot. Larger files
//! stream through a fixed-size buffer, checking the cancel flag and
//! reporting percentage progress between chunks. A cancelled copy leaves
//! whatever bytes were already written at the destination; the next pass
//! sees a stale mtime there and re-copies the file from the start.

use crate::error::{Error, Result, classify_io};
use crate::scanner::FileTask;
use crate::sink::{NotificationSink, StatusSink};
use crate::stats::{StatsAggregator, format_size};
use filetime::FileTime;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Copy buffer size; also the threshold below which a file is copied whole.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Result of running a batch of copy tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassOutcome {
    /// Tasks that failed with an error other than cancellation.
    pub failed: u64,
    /// Whether the batch stopped early because the cancel flag was set.
    pub interrupted: bool,
}

/// Executes copy tasks on a dedicated worker pool.
#[derive(Clone)]
pub struct CopyExecutor {
    cancel: Arc<AtomicBool>,
    stats: StatsAggregator,
    status: Arc<dyn StatusSink>,
    notifier: Arc<dyn NotificationSink>,
}

impl CopyExecutor {
    pub fn new(
        cancel: Arc<AtomicBool>,
        stats: StatsAggregator,
        status: Arc<dyn StatusSink>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            cancel,
            stats,
            status,
            notifier,
        }
    }

    /// Run `tasks` across a pool of `max_threads` workers.
    ///
    /// Per-file failures are reported and counted but do not stop the batch;
    /// cancellation stops every worker at its next chunk boundary.
    pub fn copy_all(&self, tasks: Vec<FileTask>, max_threads: usize) -> Result<PassOutcome> {
        if tasks.is_empty() {
            return Ok(PassOutcome::default());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_threads.max(1))
            .build()
            .map_err(|e| Error::Thread(format!("could not build copy pool: {e}")))?;

        let outcomes: Vec<Result<()>> = pool.install(|| {
            tasks
                .par_iter()
                .map(|task| self.copy(task))
                .collect()
        });

        let mut outcome = PassOutcome::default();
        for result in outcomes {
            match result {
                Ok(()) => {}
                Err(e) if e.is_interrupt() => outcome.interrupted = true,
                Err(_) => outcome.failed += 1,
            }
        }
        Ok(outcome)
    }

    /// Copy one file, reporting failures through the notification sink.
    ///
    /// Cancellation is returned to the caller but never notified.
    pub fn copy(&self, task: &FileTask) -> Result<()> {
        match self.copy_inner(task) {
            Ok(()) => Ok(()),
            Err(e) if e.is_interrupt() => Err(e),
            Err(e) => {
                warn!("copy failed for {}: {e}", task.source.display());
                let mut details = BTreeMap::new();
                details.insert("source".into(), task.source.display().to_string());
                details.insert("target".into(), task.target.display().to_string());
                details.insert("category".into(), e.category().to_string());
                if let Error::Permission { .. } = &e {
                    if let Ok(meta) = fs::metadata(&task.source) {
                        details.insert("size".into(), format_size(meta.len()));
                    }
                }
                self.notifier
                    .error(&format!("copy failed for {}: {e}", task.source.display()), &details);
                Err(e)
            }
        }
    }

    fn copy_inner(&self, task: &FileTask) -> Result<()> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(self.interrupt());
        }

        if let Some(parent) = task.target.parent() {
            fs::create_dir_all(parent).map_err(|e| classify_io(parent, e))?;
        }

        let meta = fs::metadata(&task.source).map_err(|e| classify_io(&task.source, e))?;
        let total = meta.len();
        let name = basename(&task.source);

        if total as usize <= CHUNK_SIZE {
            fs::copy(&task.source, &task.target)
                .map_err(|e| classify_io(&task.source, e))?;
            self.status.status(&format!("{name} - 100.0%"), Some(100.0));
        } else {
            self.copy_chunked(task, total, &name)?;
        }

        self.preserve_metadata(&task.target, &meta);
        self.stats.update(total, 1, &name);
        debug!("copied {} ({})", task.source.display(), format_size(total));
        Ok(())
    }

    fn copy_chunked(&self, task: &FileTask, total: u64, name: &str) -> Result<()> {
        let mut reader = File::open(&task.source).map_err(|e| classify_io(&task.source, e))?;
        let mut writer = File::create(&task.target).map_err(|e| classify_io(&task.target, e))?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut written: u64 = 0;

        loop {
            // Cancellation leaves the partial destination file in place
            if self.cancel.load(Ordering::Relaxed) {
                return Err(self.interrupt());
            }
            let n = reader.read(&mut buf).map_err(|e| classify_io(&task.source, e))?;
            if n == 0 {
                break;
            }
            writer
                .write_all(&buf[..n])
                .map_err(|e| classify_io(&task.target, e))?;
            written += n as u64;

            let pct = if total > 0 {
                (written as f64 / total as f64) * 100.0
            } else {
                100.0
            };
            self.status.status(&format!("{name} - {pct:.1}%"), Some(pct));
        }
        writer.flush().map_err(|e| classify_io(&task.target, e))?;
        Ok(())
    }

    /// Best effort; a file whose timestamps cannot be set still counts as
    /// copied, it will just be re-examined next pass.
    fn preserve_metadata(&self, target: &Path, meta: &fs::Metadata) {
        if let Err(e) = fs::set_permissions(target, meta.permissions()) {
            warn!("could not set permissions on {}: {e}", target.display());
        }
        let mtime = FileTime::from_last_modification_time(meta);
        let atime = FileTime::from_last_access_time(meta);
        if let Err(e) = filetime::set_file_times(target, atime, mtime) {
            warn!("could not set timestamps on {}: {e}", target.display());
        }
    }

    fn interrupt(&self) -> Error {
        let snapshot = self.stats.snapshot();
        Error::Interrupted {
            files_copied: snapshot.files_copied,
            bytes_copied: snapshot.bytes_copied,
        }
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::NullSink;
    use crate::sink::testing::RecordingSink;
    use std::sync::atomic::AtomicUsize;
    use tempfile::tempdir;

    fn executor(cancel: Arc<AtomicBool>) -> (CopyExecutor, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let exec = CopyExecutor::new(
            cancel,
            StatsAggregator::new(),
            sink.clone(),
            sink.clone(),
        );
        (exec, sink)
    }

    #[test]
    fn test_small_file_copied_whole() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("small.txt");
        let target = dir.path().join("out").join("small.txt");
        fs::write(&source, b"hello").unwrap();

        let (exec, sink) = executor(Arc::new(AtomicBool::new(false)));
        exec.copy(&FileTask {
            source: source.clone(),
            target: target.clone(),
        })
        .unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"hello");
        let statuses = sink.statuses.lock().unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].0, "small.txt - 100.0%");
        assert_eq!(statuses[0].1, Some(100.0));
    }

    #[test]
    fn test_large_file_chunked_with_progress() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("big.bin");
        let target = dir.path().join("big.out");
        // Two and a half chunks
        let payload: Vec<u8> = (0..(CHUNK_SIZE * 5 / 2)).map(|i| (i % 251) as u8).collect();
        fs::write(&source, &payload).unwrap();

        let (exec, sink) = executor(Arc::new(AtomicBool::new(false)));
        exec.copy(&FileTask {
            source: source.clone(),
            target: target.clone(),
        })
        .unwrap();

        assert_eq!(fs::read(&target).unwrap(), payload);
        let statuses = sink.statuses.lock().unwrap();
        assert_eq!(statuses.len(), 3);
        let pcts: Vec<f64> = statuses.iter().filter_map(|(_, p)| *p).collect();
        assert!(pcts.windows(2).all(|w| w[0] < w[1]));
        assert!((pcts[2] - 100.0).abs() < 0.01);
        assert!(statuses[2].0.starts_with("big.bin - "));
    }

    #[test]
    fn test_mtime_preserved() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a");
        let target = dir.path().join("b");
        fs::write(&source, "x").unwrap();
        filetime::set_file_mtime(&source, FileTime::from_unix_time(1_400_000_000, 0)).unwrap();

        let (exec, _) = executor(Arc::new(AtomicBool::new(false)));
        exec.copy(&FileTask {
            source,
            target: target.clone(),
        })
        .unwrap();

        let mtime = FileTime::from_last_modification_time(&fs::metadata(&target).unwrap());
        assert_eq!(mtime.unix_seconds(), 1_400_000_000);
    }

    /// Status sink that raises the cancel flag after the first chunk lands.
    struct CancelAfterFirstChunk {
        cancel: Arc<AtomicBool>,
        chunks: AtomicUsize,
    }

    impl StatusSink for CancelAfterFirstChunk {
        fn status(&self, _message: &str, _progress: Option<f64>) {
            if self.chunks.fetch_add(1, Ordering::SeqCst) == 0 {
                self.cancel.store(true, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_cancel_mid_copy_writes_at_most_one_more_chunk() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("big.bin");
        let target = dir.path().join("out.bin");
        fs::write(&source, vec![1u8; CHUNK_SIZE * 4]).unwrap();

        let cancel = Arc::new(AtomicBool::new(false));
        let notifier = Arc::new(RecordingSink::default());
        let status = Arc::new(CancelAfterFirstChunk {
            cancel: cancel.clone(),
            chunks: AtomicUsize::new(0),
        });
        let exec = CopyExecutor::new(
            cancel,
            StatsAggregator::new(),
            status,
            notifier.clone(),
        );

        let err = exec
            .copy(&FileTask {
                source,
                target: target.clone(),
            })
            .unwrap_err();
        assert!(err.is_interrupt());

        // One chunk was already written when the flag went up; the copy may
        // finish at most one more before its next checkpoint. The partial
        // destination file stays in place.
        let written = fs::metadata(&target).unwrap().len();
        assert!(written >= CHUNK_SIZE as u64, "written: {written}");
        assert!(written <= 2 * CHUNK_SIZE as u64, "written: {written}");
        assert!(notifier.errors.lock().unwrap().is_empty());
    }

    #[test]
    fn test_cancel_interrupts_without_notification() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("big.bin");
        fs::write(&source, vec![0u8; CHUNK_SIZE * 2]).unwrap();

        let (exec, sink) = executor(Arc::new(AtomicBool::new(true)));
        let err = exec
            .copy(&FileTask {
                source,
                target: dir.path().join("out.bin"),
            })
            .unwrap_err();

        assert!(err.is_interrupt());
        assert!(sink.errors.lock().unwrap().is_empty());
    }

    #[test]
    fn test_missing_source_notifies_failure() {
        let dir = tempdir().unwrap();
        let (exec, sink) = executor(Arc::new(AtomicBool::new(false)));
        let err = exec
            .copy(&FileTask {
                source: dir.path().join("absent.bin"),
                target: dir.path().join("out.bin"),
            })
            .unwrap_err();

        assert!(matches!(err, Error::FileOperation { .. }));
        let errors = sink.errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].1.get("category").map(String::as_str), Some("copy"));
        assert!(errors[0].1.contains_key("source"));
        assert!(errors[0].1.contains_key("target"));
    }

    #[test]
    fn test_copy_all_counts_failures_and_continues() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good.txt");
        fs::write(&good, "data").unwrap();

        let tasks = vec![
            FileTask {
                source: dir.path().join("missing.txt"),
                target: dir.path().join("out").join("missing.txt"),
            },
            FileTask {
                source: good,
                target: dir.path().join("out").join("good.txt"),
            },
        ];

        let exec = CopyExecutor::new(
            Arc::new(AtomicBool::new(false)),
            StatsAggregator::new(),
            Arc::new(NullSink),
            Arc::new(NullSink),
        );
        let outcome = exec.copy_all(tasks, 2).unwrap();
        assert_eq!(outcome.failed, 1);
        assert!(!outcome.interrupted);
        assert_eq!(
            fs::read_to_string(dir.path().join("out").join("good.txt")).unwrap(),
            "data"
        );
    }

    #[test]
    fn test_copy_all_empty_batch() {
        let exec = CopyExecutor::new(
            Arc::new(AtomicBool::new(false)),
            StatsAggregator::new(),
            Arc::new(NullSink),
            Arc::new(NullSink),
        );
        assert_eq!(exec.copy_all(Vec::new(), 4).unwrap(), PassOutcome::default());
    }

    #[test]
    fn test_stats_updated_after_copy() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("s.txt");
        fs::write(&source, vec![7u8; 2048]).unwrap();

        let stats = StatsAggregator::new();
        stats.reset();
        let exec = CopyExecutor::new(
            Arc::new(AtomicBool::new(false)),
            stats.clone(),
            Arc::new(NullSink),
            Arc::new(NullSink),
        );
        exec.copy(&FileTask {
            source,
            target: dir.path().join("t.txt"),
        })
        .unwrap();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.files_copied, 1);
        assert_eq!(snapshot.bytes_copied, 2048);
        assert_eq!(snapshot.current_file, "s.txt");
    }
}
