//! Capability interfaces for external collaborators.
//!
//! The engine never talks to a GUI or a mail transport directly; it emits
//! textual progress through a [`StatusSink`] and structured error events
//! through a [`NotificationSink`]. Cancellation is deliberately *not* an
//! error event and is never sent to a notification sink.

use std::collections::BTreeMap;
use tracing::{error, info};

/// Receives textual progress updates during copies and a summary after each
/// pass.
pub trait StatusSink: Send + Sync {
    /// `progress` is a percentage in `0.0..=100.0` when the message relates
    /// to an individual file copy, `None` for plain status text.
    fn status(&self, message: &str, progress: Option<f64>);
}

/// Receives structured error events: validation failures, permission
/// failures, generic copy failures, backup failures, pass-level failures,
/// and thread start/stop failures.
pub trait NotificationSink: Send + Sync {
    /// `details` carries context such as source/target paths, the error
    /// category, and relevant stats.
    fn error(&self, message: &str, details: &BTreeMap<String, String>);
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl StatusSink for NullSink {
    fn status(&self, _message: &str, _progress: Option<f64>) {}
}

impl NotificationSink for NullSink {
    fn error(&self, _message: &str, _details: &BTreeMap<String, String>) {}
}

/// Sink that forwards to the tracing subscriber.
///
/// Useful when no GUI or mail transport is wired up but the events should
/// still land somewhere observable.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn status(&self, message: &str, progress: Option<f64>) {
        match progress {
            Some(pct) => info!(progress = format!("{pct:.1}"), "{message}"),
            None => info!("{message}"),
        }
    }
}

impl NotificationSink for LogSink {
    fn error(&self, message: &str, details: &BTreeMap<String, String>) {
        error!(?details, "{message}");
    }
}
