//! Terminal progress for batched scans, drawn with indicatif.
//!
//! [`ScanCoordinator::run`](crate::session::ScanCoordinator::run) reports
//! through [`ProgressCallback`]; [`Progress`] turns those calls into a single
//! bar that starts at the resumed offset.

use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::session::{BatchReport, ScanState, ScanStatus};

/// Receives scan lifecycle events.
pub trait ProgressCallback: Send + Sync {
    /// A scan run is starting with `processed` of `total` items already done.
    fn on_scan_start(&self, total: usize, processed: usize);

    /// One batch was folded in.
    fn on_batch(&self, report: &BatchReport);

    /// The run ended: complete, stopped, or out of batches.
    fn on_scan_end(&self, status: &ScanStatus);

    /// Free-form status text.
    fn on_message(&self, _message: &str) {}
}

/// Progress bar reporter.
pub struct Progress {
    bar: Mutex<Option<ProgressBar>>,
    quiet: bool,
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("quiet", &self.quiet)
            .finish_non_exhaustive()
    }
}

impl Progress {
    /// Create a reporter. A quiet reporter draws nothing.
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            bar: Mutex::new(None),
            quiet,
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} items ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-")
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(bar) = guard.as_ref() {
                f(bar);
            }
        }
    }
}

impl ProgressCallback for Progress {
    fn on_scan_start(&self, total: usize, processed: usize) {
        if self.quiet {
            return;
        }
        let bar = ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr());
        bar.set_style(Self::style());
        bar.set_position(processed as u64);
        if processed > 0 {
            bar.set_message("resumed");
        }
        bar.enable_steady_tick(Duration::from_millis(120));

        if let Ok(mut guard) = self.bar.lock() {
            *guard = Some(bar);
        }
    }

    fn on_batch(&self, report: &BatchReport) {
        self.with_bar(|bar| {
            // The collection can shrink mid-scan.
            bar.set_length(report.status.total as u64);
            bar.set_position(report.status.processed as u64);
            if report.outcome.missing > 0 {
                bar.set_message(format!("{} missing", report.outcome.missing));
            }
        });
    }

    fn on_scan_end(&self, status: &ScanStatus) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(bar) = guard.take() {
                match status.state {
                    ScanState::Complete => bar.finish_with_message("done"),
                    ScanState::Stopped => bar.abandon_with_message("stopped"),
                    _ => bar.abandon(),
                }
            }
        }
    }

    fn on_message(&self, message: &str) {
        self.with_bar(|bar| bar.set_message(message.to_string()));
    }
}
