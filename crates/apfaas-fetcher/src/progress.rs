//! Progress reporting handles.
//!
//! A handle is created for one partition run and passed into every request
//! of that partition. The runner only calls it; it never owns the display.

use std::sync::atomic::{AtomicUsize, Ordering};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::info;

/// Receives per-request progress for one partition.
pub trait ProgressReporter: Send + Sync {
    /// One request finished; `label` is `<METHOD> <path>`.
    fn advance(&self, label: &str);

    /// The partition finished.
    fn finish(&self) {}
}

/// Discards all progress updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn advance(&self, _label: &str) {}
}

/// `indicatif` bar for one partition.
pub struct BarProgress {
    bar: ProgressBar,
    index: usize,
}

impl BarProgress {
    /// Bar attached to a shared multi-bar display.
    pub fn attached(multi: &MultiProgress, index: usize, total: usize) -> Self {
        let bar = multi.add(ProgressBar::new(total as u64));
        Self::styled(bar, index)
    }

    fn styled(bar: ProgressBar, index: usize) -> Self {
        let style = ProgressStyle::with_template(
            "{prefix:.bold} {msg:24} [{bar:40.cyan/blue}] {percent:>3}% [{elapsed_precise}, {per_sec}]",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");

        bar.set_style(style);
        bar.set_prefix(format!("Process {} ({})", index + 1, std::process::id()));
        Self { bar, index }
    }
}

impl ProgressReporter for BarProgress {
    fn advance(&self, label: &str) {
        self.bar.set_message(label.to_string());
        self.bar.inc(1);
    }

    fn finish(&self) {
        self.bar
            .finish_with_message(format!("Fetch completed: {}", self.index + 1));
    }
}

/// Line-based progress for worker processes, which share one stderr.
///
/// Logs an event each time the partition crosses another tenth of its
/// requests, so concurrent workers never redraw over each other.
pub struct LogProgress {
    index: usize,
    total: usize,
    done: AtomicUsize,
}

impl LogProgress {
    pub fn new(index: usize, total: usize) -> Self {
        Self {
            index,
            total,
            done: AtomicUsize::new(0),
        }
    }

    pub fn completed(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }
}

impl ProgressReporter for LogProgress {
    fn advance(&self, label: &str) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if self.total == 0 {
            return;
        }
        let tenth = done * 10 / self.total;
        if tenth > (done - 1) * 10 / self.total {
            info!(
                partition = self.index + 1,
                pid = std::process::id(),
                done,
                total = self.total,
                last = label,
                "Fetch progress {}%",
                tenth * 10
            );
        }
    }

    fn finish(&self) {
        info!(
            partition = self.index + 1,
            done = self.completed(),
            "Fetch completed: {}",
            self.index + 1
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indicatif::ProgressDrawTarget;

    #[test]
    fn test_hidden_bar_counts() {
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        let progress = BarProgress::attached(&multi, 0, 3);

        progress.advance("GET weather");
        progress.advance("POST weather");
        assert_eq!(progress.bar.position(), 2);

        progress.finish();
        assert!(progress.bar.is_finished());
    }

    #[test]
    fn test_log_progress_counts_every_request() {
        let progress = LogProgress::new(1, 4);
        for _ in 0..4 {
            progress.advance("GET weather");
        }
        progress.finish();
        assert_eq!(progress.completed(), 4);
    }
}
