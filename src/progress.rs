//! Progress reporting.
//!
//! Long operations report progress through the [`ProgressCallback`] trait so
//! the library stays independent of any particular frontend. The CLI driver
//! plugs in [`Progress`], an indicatif-based implementation; background tasks
//! forward the same events over their event channel.

use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Observer for progress of a long-running operation.
///
/// `current` is monotonically non-decreasing within one operation, `total`
/// constant once known. Events arrive at a bounded cadence, not per file.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts. `total` may be 0 when unknown.
    fn on_phase_start(&self, _phase: &str, _total: usize) {}

    /// Called as work advances.
    fn on_progress(&self, current: usize, total: usize);

    /// Called when a phase completes.
    fn on_phase_end(&self, _phase: &str) {}
}

/// Terminal progress bars for the CLI driver.
pub struct Progress {
    bar: Mutex<Option<ProgressBar>>,
    quiet: bool,
}

impl Progress {
    /// Create a progress reporter. With `quiet` set, nothing is displayed.
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            bar: Mutex::new(None),
            quiet,
        }
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}] {pos} files")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }
        let pb = if total == 0 {
            let pb = ProgressBar::new_spinner();
            pb.set_style(Self::spinner_style());
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        } else {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(Self::bar_style());
            pb
        };
        pb.set_message(phase.to_string());
        let mut bar = self.bar.lock().unwrap();
        if let Some(old) = bar.take() {
            old.finish_and_clear();
        }
        *bar = Some(pb);
    }

    fn on_progress(&self, current: usize, total: usize) {
        if self.quiet {
            return;
        }
        if let Some(pb) = &*self.bar.lock().unwrap() {
            if total > 0 && pb.length() != Some(total as u64) {
                pb.set_length(total as u64);
            }
            pb.set_position(current as u64);
        }
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }
        if let Some(pb) = self.bar.lock().unwrap().take() {
            pb.finish_with_message(format!("{phase} complete"));
        }
    }
}

/// Fan a progress stream out to several callbacks.
///
/// Used when an operation must feed both a task's event channel and a
/// display callback.
pub struct Tee {
    sinks: Vec<std::sync::Arc<dyn ProgressCallback>>,
}

impl Tee {
    /// Combine callbacks into one.
    #[must_use]
    pub fn new(sinks: Vec<std::sync::Arc<dyn ProgressCallback>>) -> Self {
        Self { sinks }
    }
}

impl ProgressCallback for Tee {
    fn on_phase_start(&self, phase: &str, total: usize) {
        for sink in &self.sinks {
            sink.on_phase_start(phase, total);
        }
    }

    fn on_progress(&self, current: usize, total: usize) {
        for sink in &self.sinks {
            sink.on_progress(current, total);
        }
    }

    fn on_phase_end(&self, phase: &str) {
        for sink in &self.sinks {
            sink.on_phase_end(phase);
        }
    }
}
