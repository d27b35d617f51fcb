//! Elapsed-time logging for slow operations.

use std::time::{Duration, Instant};

use tracing::info;

/// Logs how long a labelled operation took when finished or dropped.
///
/// Used around the transcription round trip so latency regressions are
/// visible in the log without a metrics pipeline.
#[derive(Debug)]
pub struct Stopwatch {
    label: &'static str,
    started: Instant,
    reported: bool,
}

impl Stopwatch {
    /// Starts timing `label`.
    #[must_use]
    pub fn start(label: &'static str) -> Self {
        Self {
            label,
            started: Instant::now(),
            reported: false,
        }
    }

    /// Time since start.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Logs the elapsed time and disarms the drop report.
    pub fn finish(mut self) -> Duration {
        let elapsed = self.elapsed();
        self.report(elapsed);
        elapsed
    }

    fn report(&mut self, elapsed: Duration) {
        if !self.reported {
            self.reported = true;
            #[allow(clippy::cast_possible_truncation)]
            let elapsed_ms = elapsed.as_millis() as u64;
            info!(label = self.label, elapsed_ms, "operation timed");
        }
    }
}

impl Drop for Stopwatch {
    // Early returns still get timed.
    fn drop(&mut self) {
        let elapsed = self.elapsed();
        self.report(elapsed);
    }
}
