// Download Coordinator: runs one processor task per segment under a permit ceiling.
//
// Workers report `(name, outcome)` over a completion channel. A single
// aggregator owns `DownloadStats` and the progress sink.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, error, info, warn};

use crate::config::MAX_CONCURRENCY;
use crate::error::DownloadError;
use crate::manifest::Manifest;
use crate::processor::{SegmentOutcome, SegmentProcessor};
use crate::progress::{ProgressSink, ProgressSnapshot};

/// Counters of one download run.
#[derive(Debug, Clone)]
pub struct DownloadStats {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub started_at: Instant,
    /// Names of the segments that failed
    pub failed_segments: Vec<String>,
    /// Bytes written in this run
    pub bytes_written: u64,
}

impl DownloadStats {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            succeeded: 0,
            skipped: 0,
            failed: 0,
            started_at: Instant::now(),
            failed_segments: Vec::new(),
            bytes_written: 0,
        }
    }

    pub fn completed(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }

    /// Segments that are on disk after the run
    pub fn present(&self) -> usize {
        self.succeeded + self.skipped
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot::compute(self.completed(), self.total, self.elapsed())
    }

    fn record(&mut self, name: String, outcome: &SegmentOutcome) {
        match outcome {
            SegmentOutcome::Downloaded { bytes } => {
                self.succeeded += 1;
                self.bytes_written += bytes;
            }
            SegmentOutcome::Skipped => self.skipped += 1,
            SegmentOutcome::Failed(_) => {
                self.failed += 1;
                self.failed_segments.push(name);
            }
        }
    }
}

pub struct DownloadCoordinator {
    processor: SegmentProcessor,
    concurrency: usize,
}

impl DownloadCoordinator {
    pub fn new(processor: SegmentProcessor, concurrency: usize) -> Self {
        Self {
            processor,
            concurrency: concurrency.clamp(1, MAX_CONCURRENCY),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Download every segment of `manifest` into `target_dir`.
    ///
    /// Returns once every segment has reached a terminal outcome. Only a
    /// failure to create `target_dir` is an error; per-segment failures are
    /// counted in the returned stats.
    pub async fn download(
        &self,
        manifest: &Manifest,
        target_dir: &Path,
        progress: &mut dyn ProgressSink,
    ) -> Result<DownloadStats, DownloadError> {
        tokio::fs::create_dir_all(target_dir)
            .await
            .map_err(|source| DownloadError::DirectoryCreate {
                path: target_dir.to_path_buf(),
                source,
            })?;

        let total = manifest.len();
        info!(
            segments = total,
            concurrency = self.concurrency,
            dir = %target_dir.display(),
            "Starting segment download"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let (tx, mut rx) = mpsc::channel::<(String, SegmentOutcome)>(self.concurrency);
        let target_dir = Arc::new(target_dir.to_path_buf());
        let encryption = manifest.key().cloned().map(Arc::new);

        let dispatch = async move {
            for descriptor in manifest.segments().iter().cloned() {
                // Blocks submission until a worker slot frees up.
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        error!(error = %e, "Permit pool closed, stopping dispatch");
                        break;
                    }
                };

                let processor = self.processor.clone();
                let target_dir = Arc::clone(&target_dir);
                let encryption = encryption.clone();
                let tx = tx.clone();

                tokio::spawn(async move {
                    let outcome = processor
                        .process(&descriptor, &target_dir, encryption.as_deref())
                        .await;
                    drop(permit);
                    if tx.send((descriptor.name, outcome)).await.is_err() {
                        debug!("Aggregator gone, dropping segment outcome");
                    }
                });
            }
            // The last sender clone lives in the final worker.
            drop(tx);
        };

        let aggregate = async {
            let mut stats = DownloadStats::new(total);
            progress.start(total);
            while let Some((name, outcome)) = rx.recv().await {
                if let SegmentOutcome::Failed(e) = &outcome {
                    debug!(segment = %name, error = %e, "Segment counted as failed");
                }
                stats.record(name, &outcome);
                progress.update(&stats.snapshot());
            }
            progress.finish(&stats.snapshot());
            stats
        };

        let ((), stats) = tokio::join!(dispatch, aggregate);

        if stats.completed() != stats.total {
            // A worker panicked before reporting.
            warn!(
                expected = stats.total,
                reported = stats.completed(),
                "Some segment tasks did not report an outcome"
            );
        }

        info!(
            succeeded = stats.succeeded,
            skipped = stats.skipped,
            failed = stats.failed,
            bytes = stats.bytes_written,
            elapsed_ms = stats.elapsed().as_millis() as u64,
            "Segment download finished"
        );
        Ok(stats)
    }
}
