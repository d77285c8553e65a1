//! The sync engine: lifecycle, validation, and the continuous loop.
//!
//! [`SyncEngine`] owns one source/target pair and a background loop thread.
//! Each pass scans the source, filters, backs up overwrite targets, copies
//! concurrently, then sleeps for the configured interval. The loop runs
//! until [`SyncEngine::stop`] raises the cancel flag or a pass-level error
//! ends it.
//!
//! Start and stop are single-flight: starting an engine that is already
//! running is a no-op, as is stopping one that is idle. The state machine
//! is Idle -> Running -> Stopping -> Idle, nothing else.

use crate::backup::BackupManager;
use crate::config::SyncConfig;
use crate::copy::{CopyExecutor, PassOutcome};
use crate::error::{Error, Result};
use crate::scanner::{ChangeDetector, FileTask, TreeScanner, needs_update};
use crate::sink::{NotificationSink, NullSink, StatusSink};
use crate::stats::{StatsAggregator, SyncStats};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// How long `stop` waits for the loop thread before giving up.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Granularity of interruptible sleeps and stop polling.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Name of the throwaway file used to probe target writability.
const WRITE_PROBE: &str = ".write_test";

/// Lifecycle state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    /// No loop thread; `start` will spawn one.
    Idle = 0,
    /// Loop thread active.
    Running = 1,
    /// `stop` requested, waiting for the loop thread to exit.
    Stopping = 2,
}

impl RunState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => RunState::Running,
            2 => RunState::Stopping,
            _ => RunState::Idle,
        }
    }
}

/// Everything the loop thread needs, cheap to clone into the thread.
#[derive(Clone)]
struct EngineCore {
    source: PathBuf,
    target: PathBuf,
    config: Arc<Mutex<SyncConfig>>,
    stats: StatsAggregator,
    cancel: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    status: Arc<dyn StatusSink>,
    notifier: Arc<dyn NotificationSink>,
}

impl EngineCore {
    fn config(&self) -> SyncConfig {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn run_state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn notify_error(&self, err: &Error) {
        let mut details = BTreeMap::new();
        details.insert("category".into(), err.category().into());
        details.insert("source".into(), self.source.display().to_string());
        details.insert("target".into(), self.target.display().to_string());
        self.notifier.error(&err.to_string(), &details);
    }

    /// Config invariants plus path preconditions, checked before every start
    /// and every one-shot pass.
    fn validate(&self) -> Result<()> {
        self.config().validate()?;
        validate_paths(&self.source, &self.target)
    }

    /// One full pass: validate, scan, filter, back up, copy, summarize.
    ///
    /// Paths are re-validated on every pass, not just at start: a target
    /// that breaks while the loop is running fails the pass as a whole
    /// instead of degrading into a per-file failure for every copy.
    fn run_pass(&self) -> Result<PassOutcome> {
        self.validate()?;
        let config = self.config();
        self.stats.reset();
        info!("pass started for {}", self.source.display());

        let detector = ChangeDetector::from_config(&config);
        let scanner =
            TreeScanner::new(&self.source, &self.target, &config, self.cancel.clone())?;
        let tasks: Vec<FileTask> = scanner
            .filter(|task| {
                detector.should_copy(&task.source) && needs_update(&task.source, &task.target)
            })
            .collect();
        if self.cancel.load(Ordering::Relaxed) {
            return Err(self.interrupt());
        }

        let backups = BackupManager::from_config(&config, self.notifier.clone());
        for task in &tasks {
            // Backups run serially; without this checkpoint a large overwrite
            // set could outlast the stop timeout before any copy starts
            if self.cancel.load(Ordering::Relaxed) {
                return Err(self.interrupt());
            }
            backups.backup(&task.target);
        }

        let executor = CopyExecutor::new(
            self.cancel.clone(),
            self.stats.clone(),
            self.status.clone(),
            self.notifier.clone(),
        );
        let outcome = executor.copy_all(tasks, config.max_threads)?;
        if outcome.interrupted {
            return Err(self.interrupt());
        }

        self.stats.complete();
        self.status.status(&self.stats.summary(), None);
        Ok(outcome)
    }

    fn run_loop(&self) {
        loop {
            match self.run_pass() {
                Ok(outcome) => {
                    if outcome.failed > 0 {
                        warn!("{} file(s) failed this pass", outcome.failed);
                    }
                }
                Err(e) if e.is_interrupt() => {
                    info!("sync loop stopped: {e}");
                    break;
                }
                Err(e) => {
                    error!("sync pass failed: {e}");
                    self.notify_error(&e);
                    break;
                }
            }

            let interval = Duration::from_secs(self.config().check_interval);
            if self.sleep_interruptibly(interval) {
                info!("sync loop stopped during interval wait");
                break;
            }
        }
        self.state.store(RunState::Idle as u8, Ordering::SeqCst);
    }

    /// Sleep for `total`, polling the cancel flag. Returns true if cancelled.
    fn sleep_interruptibly(&self, total: Duration) -> bool {
        let deadline = Instant::now() + total;
        loop {
            if self.cancel.load(Ordering::Relaxed) {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            thread::sleep(remaining.min(POLL_INTERVAL));
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

/// One-way mirroring engine for a single source/target pair.
///
/// # Example
///
/// ```no_run
/// use mirrorsync::{SyncConfig, SyncEngine};
///
/// let mut engine = SyncEngine::new(
///     "/srv/data",
///     "/mnt/mirror",
///     SyncConfig::default().with_check_interval(30),
/// );
/// engine.start()?;
/// // ... later ...
/// engine.stop()?;
/// # Ok::<(), mirrorsync::Error>(())
/// ```
pub struct SyncEngine {
    core: EngineCore,
    handle: Option<JoinHandle<()>>,
}

impl SyncEngine {
    /// Create an engine. Nothing is validated or touched until a pass runs.
    pub fn new(
        source: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
        config: SyncConfig,
    ) -> Self {
        Self {
            core: EngineCore {
                source: source.into(),
                target: target.into(),
                config: Arc::new(Mutex::new(config)),
                stats: StatsAggregator::new(),
                cancel: Arc::new(AtomicBool::new(false)),
                state: Arc::new(AtomicU8::new(RunState::Idle as u8)),
                status: Arc::new(NullSink),
                notifier: Arc::new(NullSink),
            },
            handle: None,
        }
    }

    /// Attach a progress sink.
    #[must_use]
    pub fn with_status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.core.status = sink;
        self
    }

    /// Attach an error-event sink.
    #[must_use]
    pub fn with_notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.core.notifier = sink;
        self
    }

    /// Start the continuous sync loop on a background thread.
    ///
    /// A no-op if the engine is already running or stopping.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] or [`Error::Validation`] when preconditions
    /// fail, [`Error::Thread`] when the loop thread cannot be spawned. All of
    /// these are also reported through the notification sink.
    pub fn start(&mut self) -> Result<()> {
        if self.core.run_state() != RunState::Idle {
            info!("start ignored, engine already active");
            return Ok(());
        }
        if let Err(e) = self.core.validate() {
            self.core.notify_error(&e);
            return Err(e);
        }

        self.core.cancel.store(false, Ordering::SeqCst);
        self.core.state.store(RunState::Running as u8, Ordering::SeqCst);
        let core = self.core.clone();
        match thread::Builder::new()
            .name("mirrorsync-loop".into())
            .spawn(move || core.run_loop())
        {
            Ok(handle) => {
                self.handle = Some(handle);
                info!("sync loop started");
                Ok(())
            }
            Err(e) => {
                self.core.state.store(RunState::Idle as u8, Ordering::SeqCst);
                let err = Error::Thread(format!("could not start sync loop: {e}"));
                self.core.notify_error(&err);
                Err(err)
            }
        }
    }

    /// Request a stop and wait up to five seconds for the loop to exit.
    ///
    /// A no-op if the engine is not running. An in-flight copy stops at its
    /// next chunk boundary; its partial destination file is left in place and
    /// repaired by the next pass.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Thread`] when the loop thread does not exit within
    /// the timeout or exited by panicking. On timeout the thread is left to
    /// finish on its own; the raised cancel flag still ends it at the next
    /// checkpoint.
    pub fn stop(&mut self) -> Result<()> {
        if self.core.run_state() != RunState::Running {
            info!("stop ignored, engine not running");
            return Ok(());
        }
        self.core.state.store(RunState::Stopping as u8, Ordering::SeqCst);
        self.core.cancel.store(true, Ordering::SeqCst);

        let Some(handle) = self.handle.take() else {
            self.core.cancel.store(false, Ordering::SeqCst);
            self.core.state.store(RunState::Idle as u8, Ordering::SeqCst);
            return Ok(());
        };

        let deadline = Instant::now() + STOP_TIMEOUT;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }

        if !handle.is_finished() {
            let err = Error::Thread(format!(
                "sync loop did not stop within {}s",
                STOP_TIMEOUT.as_secs()
            ));
            self.core.notify_error(&err);
            return Err(err);
        }

        let joined = handle.join();
        self.core.cancel.store(false, Ordering::SeqCst);
        self.core.state.store(RunState::Idle as u8, Ordering::SeqCst);
        if joined.is_err() {
            let err = Error::Thread("sync loop panicked".into());
            self.core.notify_error(&err);
            return Err(err);
        }
        info!("sync loop stopped");
        Ok(())
    }

    /// Run exactly one pass synchronously and return its statistics.
    ///
    /// # Errors
    ///
    /// Same preconditions as [`start`](Self::start), plus any pass-level
    /// failure such as an unreadable source root or an interrupt.
    pub fn run_once(&self) -> Result<SyncStats> {
        self.core.run_pass()?;
        Ok(self.core.stats.snapshot())
    }

    /// Snapshot of the current pass counters.
    pub fn stats(&self) -> SyncStats {
        self.core.stats.snapshot()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunState {
        self.core.run_state()
    }

    /// Whether the loop thread is active.
    pub fn is_running(&self) -> bool {
        self.core.run_state() == RunState::Running
    }

    /// Replace the configuration. Takes effect at the next pass boundary; a
    /// pass already in flight finishes under the old settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the new configuration is invalid; the
    /// old one stays in place.
    pub fn set_config(&self, config: SyncConfig) -> Result<()> {
        config.validate()?;
        *self.core.config.lock().unwrap_or_else(PoisonError::into_inner) = config;
        Ok(())
    }

    /// Current configuration.
    pub fn config(&self) -> SyncConfig {
        self.core.config()
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        // Raise the flag so a still-running loop winds down; no join here,
        // a detached loop exits at its next checkpoint
        self.core.cancel.store(true, Ordering::SeqCst);
    }
}

/// Path preconditions: source must be an existing directory, the target must
/// be creatable and writable, and the target must not sit inside the source
/// tree (mirroring into itself would recurse forever).
fn validate_paths(source: &Path, target: &Path) -> Result<()> {
    if !source.is_dir() {
        return Err(Error::Validation(format!(
            "source directory not found: {}",
            source.display()
        )));
    }
    let abs_source = source.canonicalize().map_err(|e| {
        Error::Validation(format!("cannot resolve source {}: {e}", source.display()))
    })?;
    let abs_target = std::path::absolute(target).map_err(|e| {
        Error::Validation(format!("cannot resolve target {}: {e}", target.display()))
    })?;
    if abs_target != abs_source && abs_target.starts_with(&abs_source) {
        return Err(Error::Validation(format!(
            "target {} is inside the source tree {}",
            target.display(),
            source.display()
        )));
    }

    fs::create_dir_all(target).map_err(|e| {
        Error::Validation(format!("cannot create target {}: {e}", target.display()))
    })?;
    let probe = target.join(WRITE_PROBE);
    fs::write(&probe, b"probe").map_err(|e| {
        Error::Validation(format!("target {} is not writable: {e}", target.display()))
    })?;
    if let Err(e) = fs::remove_file(&probe) {
        warn!("could not remove write probe {}: {e}", probe.display());
    }
    Ok(())
}
