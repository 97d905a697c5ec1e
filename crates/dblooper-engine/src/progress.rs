//! Progress reporting for the execution loop.

/// Receives `(rows processed, total rows)` after every row.
///
/// `processed` never decreases within one run.
pub trait ProgressReporter {
    fn report(&mut self, processed: u64, total: u64);
}

impl<F: FnMut(u64, u64)> ProgressReporter for F {
    fn report(&mut self, processed: u64, total: u64) {
        self(processed, total);
    }
}

/// Discards progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&mut self, _processed: u64, _total: u64) {}
}

/// Logs progress every `every` rows and on the last row.
#[derive(Debug, Clone)]
pub struct LogProgress {
    job: String,
    every: u64,
}

impl LogProgress {
    #[must_use]
    pub fn new(job: impl Into<String>, every: u64) -> Self {
        Self {
            job: job.into(),
            every: every.max(1),
        }
    }

    fn should_log(&self, processed: u64, total: u64) -> bool {
        processed == total || processed % self.every == 0
    }
}

impl ProgressReporter for LogProgress {
    #[allow(clippy::cast_precision_loss)]
    fn report(&mut self, processed: u64, total: u64) {
        if !self.should_log(processed, total) {
            return;
        }
        let percent = if total == 0 {
            100.0
        } else {
            processed as f64 * 100.0 / total as f64
        };
        tracing::info!(
            job = self.job.as_str(),
            processed,
            total,
            "Loop progress {percent:.1}%"
        );
    }
}
