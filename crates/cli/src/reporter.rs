//! Terminal rendering of boot sessions.
//!
//! A progress bar during installation, a status line that disappears
//! shortly after success, and an error line on failure. Everything is
//! drawn on stderr; indicatif hides it when stderr is not a terminal.

use devpack_core::{BootReport, Error, Reporter};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Status text shown after a successful boot.
pub const DONE_MESSAGE: &str = "devpack boot done.";

/// How long the success status stays visible.
pub const STATUS_DURATION: Duration = Duration::from_millis(2000);

const BAR_SCALE: u64 = 1000;

pub struct TerminalReporter {
    bar: Mutex<Option<ProgressBar>>,
    hidden: bool,
    status_duration: Duration,
}

impl TerminalReporter {
    pub const fn new(hidden: bool) -> Self {
        Self {
            bar: Mutex::new(None),
            hidden,
            status_duration: STATUS_DURATION,
        }
    }

    #[cfg(test)]
    const fn with_status_duration(mut self, duration: Duration) -> Self {
        self.status_duration = duration;
        self
    }

    fn bar(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn new_bar(&self) -> ProgressBar {
        let bar = ProgressBar::with_draw_target(Some(BAR_SCALE), self.draw_target());
        bar.set_style(
            ProgressStyle::with_template("{spinner} devpack boot [{bar:30}] {percent:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> ")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"]),
        );
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    }

    fn draw_target(&self) -> ProgressDrawTarget {
        if self.hidden {
            ProgressDrawTarget::hidden()
        } else {
            ProgressDrawTarget::stderr()
        }
    }

    /// Clear the success status once it has been visible long enough.
    pub async fn dismiss(&self) {
        let finished = self.bar().take();
        if let Some(bar) = finished {
            if !bar.is_hidden() {
                tokio::time::sleep(self.status_duration).await;
            }
            bar.finish_and_clear();
        }
    }

    /// The current status line, for tests.
    #[cfg(test)]
    fn message(&self) -> Option<String> {
        self.bar().as_ref().map(ProgressBar::message)
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn scaled(fraction: f64) -> u64 {
    (fraction.clamp(0.0, 1.0) * BAR_SCALE as f64).round() as u64
}

impl Reporter for TerminalReporter {
    fn on_start(&self, _total: usize) {
        let bar = self.new_bar();
        bar.set_message("checking tools");
        if let Some(previous) = self.bar().replace(bar) {
            previous.finish_and_clear();
        }
    }

    fn on_progress(&self, fraction: f64, message: &str) {
        if let Some(bar) = self.bar().as_ref() {
            bar.set_position(scaled(fraction));
            bar.set_message(message.to_string());
        }
    }

    fn on_success(&self, _report: &BootReport) {
        if let Some(bar) = self.bar().as_ref() {
            bar.finish_with_message(DONE_MESSAGE);
        }
    }

    fn on_failure(&self, error: &Error) {
        if let Some(bar) = self.bar().take() {
            bar.abandon_with_message(error.to_string());
        }
    }
}
