//! Completeness check run between downloading and assembly.

use tracing::{info, warn};

use crate::coordinator::DownloadStats;
use crate::error::DownloadError;

/// Whether enough segments are on disk to assemble.
///
/// Accepts when `total - (succeeded + skipped) <= total * loss_tolerance`.
/// Skipped segments count as present: only non-empty files are ever skipped.
pub fn acceptable(stats: &DownloadStats, loss_tolerance: f64) -> bool {
    let allowed = stats.total as f64 * loss_tolerance;
    let missing = stats.total.saturating_sub(stats.present());
    missing as f64 <= allowed
}

/// Like [`acceptable`], but returns the counts as an error on rejection.
pub fn ensure_complete(stats: &DownloadStats, loss_tolerance: f64) -> Result<(), DownloadError> {
    let allowed = stats.total as f64 * loss_tolerance;
    if acceptable(stats, loss_tolerance) {
        if stats.failed > 0 {
            warn!(
                failed = stats.failed,
                allowed,
                segments = ?stats.failed_segments,
                "Some segments are missing but within loss tolerance"
            );
        } else {
            info!(total = stats.total, "All segments present");
        }
        return Ok(());
    }

    Err(DownloadError::IncompleteDownload {
        expected: stats.total,
        succeeded: stats.succeeded,
        skipped: stats.skipped,
        failed: stats.failed,
        allowed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(total: usize, succeeded: usize, skipped: usize) -> DownloadStats {
        let mut stats = DownloadStats::new(total);
        stats.succeeded = succeeded;
        stats.skipped = skipped;
        stats.failed = total - succeeded - skipped;
        stats
    }

    #[test]
    fn accepts_within_tolerance() {
        assert!(acceptable(&stats(100, 91, 0), 0.1));
        assert!(acceptable(&stats(100, 90, 0), 0.1));
        assert!(acceptable(&stats(10, 10, 0), 0.0));
    }

    #[test]
    fn rejects_beyond_tolerance() {
        assert!(!acceptable(&stats(100, 89, 0), 0.1));
        assert!(!acceptable(&stats(10, 9, 0), 0.0));
    }

    #[test]
    fn skipped_segments_count_as_present() {
        assert!(acceptable(&stats(100, 10, 90), 0.0));
        assert!(acceptable(&stats(100, 0, 91), 0.1));
    }

    #[test]
    fn ensure_complete_reports_counts() {
        let err = ensure_complete(&stats(100, 80, 5), 0.1).unwrap_err();
        match err {
            DownloadError::IncompleteDownload {
                expected,
                succeeded,
                skipped,
                failed,
                allowed,
            } => {
                assert_eq!((expected, succeeded, skipped, failed), (100, 80, 5, 15));
                assert!((allowed - 10.0).abs() < 1e-9);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(ensure_complete(&stats(100, 95, 0), 0.1).is_ok());
    }
}
