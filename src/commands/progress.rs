// src/commands/progress.rs
//! Terminal progress for recipe runs
//!
//! An overall bar counts applied steps; a status line below it shows the
//! step currently running.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use provisioner::ProgressTracker;
use std::time::Duration;

/// Interactive progress display for `apply`
pub struct StepProgress {
    // Kept so both bars stay attached to the same draw target
    _multi: MultiProgress,
    overall: ProgressBar,
    status: ProgressBar,
}

impl StepProgress {
    /// Create a progress display for applying `name`
    pub fn new(name: &str) -> Self {
        let multi = MultiProgress::new();

        let overall = ProgressBar::new(0);
        overall.set_style(
            ProgressStyle::default_bar()
                .template("{prefix} ({pos}/{len}) [{bar:40.green/dim}] {percent}%")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        overall.set_prefix(name.to_string());

        let status = ProgressBar::new_spinner();
        status.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        status.enable_steady_tick(Duration::from_millis(100));

        let overall = multi.add(overall);
        let status = multi.add(status);

        Self {
            _multi: multi,
            overall,
            status,
        }
    }
}

impl ProgressTracker for StepProgress {
    fn set_message(&self, message: &str) {
        self.status.set_message(message.to_string());
    }

    fn increment(&self, amount: u64) {
        self.overall.inc(amount);
    }

    fn set_length(&self, length: u64) {
        self.overall.set_length(length);
    }

    fn position(&self) -> u64 {
        self.overall.position()
    }

    fn finish_with_message(&self, message: &str) {
        self.status.finish_and_clear();
        self.overall.finish();
        self.overall.println(format!("[COMPLETE] {}", message));
    }

    fn finish_with_error(&self, message: &str) {
        self.status.finish_and_clear();
        self.overall.abandon();
        self.overall.println(format!("[FAILED] {}", message));
    }

    fn is_finished(&self) -> bool {
        self.overall.is_finished()
    }
}
