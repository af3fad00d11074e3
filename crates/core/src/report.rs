//! Progress and outcome reporting boundary.
//!
//! The coordinator calls a [`Reporter`] at session start, every time a tool
//! pipeline settles, and once when the whole session settles. Hosts plug in
//! their own UI; [`LoggingReporter`] renders the same calls as tracing events.

use crate::Error;
use crate::provision::BootReport;
use tracing::{debug, info, warn};

/// Receives session lifecycle callbacks from the coordinator.
pub trait Reporter: Send + Sync {
    /// A boot session started for `total` tools.
    fn on_start(&self, total: usize);

    /// One tool pipeline settled; `fraction` is completed / total.
    fn on_progress(&self, fraction: f64, message: &str);

    /// Every pipeline settled and none failed.
    fn on_success(&self, report: &BootReport);

    /// Every pipeline settled and at least one failed.
    fn on_failure(&self, error: &Error);
}

/// Reporter that ignores all callbacks.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl Reporter for NoopReporter {
    fn on_start(&self, _total: usize) {}

    fn on_progress(&self, _fraction: f64, _message: &str) {}

    fn on_success(&self, _report: &BootReport) {}

    fn on_failure(&self, _error: &Error) {}
}

/// Reporter that logs callbacks using tracing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingReporter;

impl Reporter for LoggingReporter {
    fn on_start(&self, total: usize) {
        info!(tools = total, "devpack boot started");
    }

    fn on_progress(&self, fraction: f64, message: &str) {
        debug!(progress = format!("{:.0}%", fraction * 100.0), "{message}");
    }

    fn on_success(&self, report: &BootReport) {
        info!(
            installed = report.installed_count(),
            elapsed_ms = report.elapsed.as_millis(),
            "devpack boot done."
        );
    }

    fn on_failure(&self, error: &Error) {
        warn!(error = %error, "devpack boot failed");
    }
}
