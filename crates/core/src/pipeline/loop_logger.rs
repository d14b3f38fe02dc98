use std::time::Instant;

/// Why a tick performed no work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickSkip {
    /// A detect call from a previous tick is still outstanding.
    InferenceOutstanding,
    /// The stream has not produced a frame yet.
    NoFrame,
}

/// Cross-cutting observer for detection-loop events.
///
/// Decouples the loop from specific output mechanisms so callers can watch
/// cadence, latency, and failures without changing the orchestration code.
pub trait LoopLogger: Send {
    /// A tick fired but was skipped.
    fn tick_skipped(&mut self, reason: TickSkip);

    /// A cycle completed: `faces` detected, inference took `detect_ms`.
    fn cycle(&mut self, faces: usize, detect_ms: f64);

    /// A detect call failed; the loop keeps polling.
    fn inference_failed(&mut self, error: &str);

    /// Log a human-readable status message.
    fn info(&mut self, message: &str);

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&self) {}
}

/// Silent logger that discards all events. Used by tests and by callers
/// with their own progress reporting.
pub struct NullLoopLogger;

impl LoopLogger for NullLoopLogger {
    fn tick_skipped(&mut self, _reason: TickSkip) {}
    fn cycle(&mut self, _faces: usize, _detect_ms: f64) {}
    fn inference_failed(&mut self, _error: &str) {}
    fn info(&mut self, _message: &str) {}
}

/// CLI-oriented logger: accumulates per-cycle latency and skip counts and
/// reports a summary when the loop stops.
pub struct StdoutLoopLogger {
    start_time: Instant,
    detect_ms: Vec<f64>,
    faces_total: usize,
    skipped_outstanding: usize,
    skipped_no_frame: usize,
    failures: usize,
}

impl StdoutLoopLogger {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            detect_ms: Vec::new(),
            faces_total: 0,
            skipped_outstanding: 0,
            skipped_no_frame: 0,
            failures: 0,
        }
    }

    pub fn cycles(&self) -> usize {
        self.detect_ms.len()
    }

    /// Returns the formatted summary, or `None` if no cycle completed.
    pub fn summary_string(&self) -> Option<String> {
        if self.detect_ms.is_empty() && self.failures == 0 {
            return None;
        }

        let cycles = self.detect_ms.len();
        let elapsed_s = self.start_time.elapsed().as_secs_f64();
        let avg_ms = if cycles > 0 {
            self.detect_ms.iter().sum::<f64>() / cycles as f64
        } else {
            0.0
        };
        let avg_faces = if cycles > 0 {
            self.faces_total as f64 / cycles as f64
        } else {
            0.0
        };

        let mut lines = vec![format!("Loop summary ({cycles} cycles, {elapsed_s:.1}s):")];
        lines.push(format!("  detect: avg {avg_ms:.1}ms"));
        lines.push(format!("  faces per cycle: avg {avg_faces:.1}"));
        lines.push(format!(
            "  skipped ticks: {} busy, {} waiting for frames",
            self.skipped_outstanding, self.skipped_no_frame
        ));
        if self.failures > 0 {
            lines.push(format!("  inference failures: {}", self.failures));
        }
        if cycles > 0 && elapsed_s > 0.0 {
            lines.push(format!("  rate: {:.1} cycles/s", cycles as f64 / elapsed_s));
        }
        Some(lines.join("\n"))
    }
}

impl Default for StdoutLoopLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopLogger for StdoutLoopLogger {
    fn tick_skipped(&mut self, reason: TickSkip) {
        match reason {
            TickSkip::InferenceOutstanding => self.skipped_outstanding += 1,
            TickSkip::NoFrame => self.skipped_no_frame += 1,
        }
        log::debug!("tick skipped: {reason:?}");
    }

    fn cycle(&mut self, faces: usize, detect_ms: f64) {
        self.detect_ms.push(detect_ms);
        self.faces_total += faces;
        log::debug!("cycle complete: {faces} faces in {detect_ms:.1}ms");
    }

    fn inference_failed(&mut self, error: &str) {
        self.failures += 1;
        log::warn!("inference failed: {error}");
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- NullLoopLogger tests ---

    #[test]
    fn test_null_logger_all_methods_are_noop() {
        let mut logger = NullLoopLogger;
        logger.tick_skipped(TickSkip::InferenceOutstanding);
        logger.cycle(2, 15.0);
        logger.inference_failed("boom");
        logger.info("hello");
        logger.summary();
        // No panics = success
    }

    // --- StdoutLoopLogger tests ---

    #[test]
    fn test_cycles_are_counted() {
        let mut logger = StdoutLoopLogger::new();
        logger.cycle(1, 20.0);
        logger.cycle(0, 30.0);
        assert_eq!(logger.cycles(), 2);
    }

    #[test]
    fn test_summary_reports_average_latency() {
        let mut logger = StdoutLoopLogger::new();
        logger.cycle(1, 20.0);
        logger.cycle(1, 30.0);
        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("avg 25.0ms"));
        assert!(summary.contains("2 cycles"));
    }

    #[test]
    fn test_summary_counts_skips_by_reason() {
        let mut logger = StdoutLoopLogger::new();
        logger.cycle(0, 5.0);
        logger.tick_skipped(TickSkip::InferenceOutstanding);
        logger.tick_skipped(TickSkip::InferenceOutstanding);
        logger.tick_skipped(TickSkip::NoFrame);
        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("2 busy"));
        assert!(summary.contains("1 waiting"));
    }

    #[test]
    fn test_summary_includes_failures_only_when_present() {
        let mut logger = StdoutLoopLogger::new();
        logger.cycle(0, 5.0);
        assert!(!logger.summary_string().unwrap().contains("failures"));
        logger.inference_failed("transient");
        assert!(logger.summary_string().unwrap().contains("inference failures: 1"));
    }

    #[test]
    fn test_empty_summary_returns_none() {
        let logger = StdoutLoopLogger::new();
        assert!(logger.summary_string().is_none());
    }

    #[test]
    fn test_failures_alone_still_produce_summary() {
        let mut logger = StdoutLoopLogger::new();
        logger.inference_failed("boom");
        assert!(logger.summary_string().is_some());
    }
}
