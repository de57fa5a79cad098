//! Progress bars for offline replay and benchmarks
//!
//! Replays run one bar per file under a shared `MultiProgress` so parallel
//! workers do not garble each other's output.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {prefix}\n{msg}")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// One bar per replayed file
pub struct ReplayProgress {
    pub progress: ProgressBar,
}

impl ReplayProgress {
    /// Bar attached to a shared multi-progress display
    pub fn attached(multi: &MultiProgress, total_lines: u64, label: &str) -> Self {
        let progress = multi.add(ProgressBar::new(total_lines));
        progress.set_style(bar_style());
        progress.set_prefix(label.to_string());
        Self { progress }
    }

    /// Hidden bar for quiet runs and tests
    pub fn hidden() -> Self {
        Self {
            progress: ProgressBar::hidden(),
        }
    }

    pub fn tick(&self, estimates: u64, last_net_cost: f64) {
        self.progress.inc(1);
        if self.progress.position() % 256 == 0 {
            self.progress.set_message(format!(
                "📊 {} estimates | last net cost {:.6}",
                estimates, last_net_cost
            ));
        }
    }

    pub fn finish(&self, estimates: u64) {
        self.progress
            .finish_with_message(format!("✅ Replay complete! {} estimates", estimates));
    }

    pub fn finish_with_error(&self, error: &str) {
        self.progress.abandon_with_message(format!("❌ Failed: {}", error));
    }
}

/// Spinner for the benchmark run
pub struct Spinner {
    pub spinner: ProgressBar,
}

impl Spinner {
    pub fn new(message: &str) -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            spinner.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
        }
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner.set_message(message.to_string());
        Self { spinner }
    }

    pub fn finish(&self, message: &str) {
        self.spinner.finish_with_message(format!("✅ {}", message));
    }
}
