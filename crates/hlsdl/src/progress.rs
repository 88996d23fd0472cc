// Progress reporting for a download run.
//
// The coordinator's aggregator is the only producer. Rendering goes through a
// tracing span with an attached indicatif bar, so log lines printed through the
// `IndicatifLayer` writer suspend and redraw the bar instead of tearing it.

use std::time::Duration;

use indicatif::ProgressStyle;
use tracing::Span;
use tracing_indicatif::span_ext::IndicatifSpanExt;

/// Point-in-time view of a run's progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
    /// Completion percentage in `[0, 100]`
    pub percent: f64,
    /// Completed segments per second since the run started
    pub throughput: f64,
    /// `None` while throughput is zero or not finite
    pub eta: Option<Duration>,
}

impl ProgressSnapshot {
    pub fn compute(completed: usize, total: usize, elapsed: Duration) -> Self {
        let percent = if total == 0 {
            100.0
        } else {
            completed as f64 * 100.0 / total as f64
        };

        let secs = elapsed.as_secs_f64();
        let throughput = if secs > 0.0 {
            completed as f64 / secs
        } else {
            0.0
        };

        let remaining = total.saturating_sub(completed) as f64;
        let eta = if throughput.is_finite() && throughput > 0.0 {
            Duration::try_from_secs_f64(remaining / throughput).ok()
        } else {
            None
        };

        Self {
            completed,
            total,
            percent,
            throughput,
            eta,
        }
    }
}

impl std::fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} ({:.1}%) {:.2} seg/s",
            self.completed, self.total, self.percent, self.throughput
        )?;
        match self.eta {
            Some(eta) => write!(f, " ETA {}s", eta.as_secs()),
            None => write!(f, " ETA --"),
        }
    }
}

/// Receiver of progress snapshots, owned by one download run.
pub trait ProgressSink: Send {
    fn start(&mut self, total: usize);
    fn update(&mut self, snapshot: &ProgressSnapshot);
    fn finish(&mut self, snapshot: &ProgressSnapshot);
}

/// Discards all progress.
#[derive(Debug, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn start(&mut self, _total: usize) {}
    fn update(&mut self, _snapshot: &ProgressSnapshot) {}
    fn finish(&mut self, _snapshot: &ProgressSnapshot) {}
}

/// Renders progress as a bar attached to a tracing span.
///
/// Only visible when an `IndicatifLayer` is installed; otherwise a no-op.
pub struct SpanProgress {
    span: Span,
}

impl SpanProgress {
    pub fn new(name: &str) -> Self {
        Self {
            span: tracing::info_span!("download", name = %name),
        }
    }
}

impl ProgressSink for SpanProgress {
    fn start(&mut self, total: usize) {
        if let Ok(style) = ProgressStyle::with_template(
            "{span_child_prefix}{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {msg}",
        ) {
            self.span.pb_set_style(&style.progress_chars("=> "));
        }
        self.span.pb_set_length(total as u64);
        self.span.pb_set_position(0);
        self.span.pb_start();
    }

    fn update(&mut self, snapshot: &ProgressSnapshot) {
        self.span.pb_set_position(snapshot.completed as u64);
        self.span.pb_set_message(&snapshot.to_string());
    }

    fn finish(&mut self, snapshot: &ProgressSnapshot) {
        self.update(snapshot);
        // Closing the span removes the bar.
        self.span = Span::none();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_math() {
        let snap = ProgressSnapshot::compute(25, 100, Duration::from_secs(5));
        assert_eq!(snap.percent, 25.0);
        assert_eq!(snap.throughput, 5.0);
        assert_eq!(snap.eta, Some(Duration::from_secs(15)));
    }

    #[test]
    fn eta_unknown_without_throughput() {
        let at_start = ProgressSnapshot::compute(0, 10, Duration::ZERO);
        assert_eq!(at_start.throughput, 0.0);
        assert_eq!(at_start.eta, None);

        let stalled = ProgressSnapshot::compute(0, 10, Duration::from_secs(3));
        assert_eq!(stalled.eta, None);
    }

    #[test]
    fn finished_run_has_zero_eta() {
        let snap = ProgressSnapshot::compute(10, 10, Duration::from_secs(2));
        assert_eq!(snap.percent, 100.0);
        assert_eq!(snap.eta, Some(Duration::ZERO));
        assert_eq!(snap.to_string(), "10/10 (100.0%) 5.00 seg/s ETA 0s");
    }

    #[test]
    fn span_progress_without_layer_is_harmless() {
        let mut sink = SpanProgress::new("test");
        sink.start(3);
        let snap = ProgressSnapshot::compute(3, 3, Duration::from_secs(1));
        sink.update(&snap);
        sink.finish(&snap);
    }
}
