// Download Session: one end-to-end run from playlist URL to assembled file.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::assembly::{Assembler, assembler_for};
use crate::config::HlsdlConfig;
use crate::coordinator::{DownloadCoordinator, DownloadStats};
use crate::error::DownloadError;
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::files::{file_size, list_segment_files, remove_dir};
use crate::gate::ensure_complete;
use crate::manifest::SEGMENT_EXTENSION;
use crate::playlist::load_manifest;
use crate::processor::SegmentProcessor;
use crate::progress::ProgressSink;
use crate::retry::RetryPolicy;

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub output: PathBuf,
    pub stats: DownloadStats,
    pub elapsed: Duration,
    pub output_size: u64,
}

pub struct DownloadSession {
    config: HlsdlConfig,
    fetcher: Arc<dyn Fetcher>,
    assembler: Box<dyn Assembler>,
    token: CancellationToken,
}

impl DownloadSession {
    /// Session over the HTTP fetch port and the configured assembler.
    pub fn new(config: HlsdlConfig, token: CancellationToken) -> Result<Self, DownloadError> {
        config.validate()?;
        let fetcher = Arc::new(HttpFetcher::new(&config.fetch, token.clone())?);
        let assembler = assembler_for(&config.assembly);
        Ok(Self {
            config,
            fetcher,
            assembler,
            token,
        })
    }

    /// Session over caller-provided ports.
    pub fn with_ports(
        config: HlsdlConfig,
        fetcher: Arc<dyn Fetcher>,
        assembler: Box<dyn Assembler>,
        token: CancellationToken,
    ) -> Result<Self, DownloadError> {
        config.validate()?;
        Ok(Self {
            config,
            fetcher,
            assembler,
            token,
        })
    }

    pub fn config(&self) -> &HlsdlConfig {
        &self.config
    }

    fn save_root(&self) -> PathBuf {
        self.config
            .download
            .save_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Directory the segments of `name` are written to.
    pub fn segment_dir(&self, name: &str) -> PathBuf {
        self.save_root().join(name)
    }

    /// Path of the assembled output for `name`.
    pub fn output_path(&self, name: &str) -> PathBuf {
        self.save_root()
            .join(format!("{name}.{}", self.config.assembly.output_extension))
    }

    /// Download `url` and assemble it as `name`.
    pub async fn run(
        &self,
        url: &str,
        name: &str,
        progress: &mut dyn ProgressSink,
    ) -> Result<SessionReport, DownloadError> {
        validate_name(name)?;

        let started = Instant::now();
        self.assembler.check().await?;
        let manifest = load_manifest(url, self.config.download.host_mode, self.fetcher.clone()).await?;
        if self.token.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        let segment_dir = self.segment_dir(name);
        let processor = SegmentProcessor::new(
            self.fetcher.clone(),
            RetryPolicy::new(self.config.fetch.max_retries, self.config.fetch.retry_delay),
            self.token.clone(),
        );
        let coordinator = DownloadCoordinator::new(processor, self.config.download.concurrency);
        let stats = coordinator.download(&manifest, &segment_dir, progress).await?;

        if self.token.is_cancelled() {
            warn!(
                completed = stats.completed(),
                total = stats.total,
                "Download interrupted; finished segments are kept for the next run"
            );
            return Err(DownloadError::Cancelled);
        }

        ensure_complete(&stats, self.config.download.loss_tolerance)?;

        // Leftovers of an earlier, longer playlist under the same name are not ours.
        let expected: HashSet<&str> = manifest.segments().iter().map(|s| s.name.as_str()).collect();
        let mut files = list_segment_files(&segment_dir, SEGMENT_EXTENSION).await?;
        files.retain(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| expected.contains(n))
        });
        let output = self.output_path(name);
        let output = self.assembler.assemble(&files, &output).await?;

        if self.config.download.auto_clean {
            // The output exists at this point; a leftover directory is only a nuisance.
            if let Err(e) = remove_dir(&segment_dir).await {
                warn!(dir = %segment_dir.display(), error = %e, "Auto-clean failed");
            }
        }

        let output_size = file_size(&output).await?;
        let elapsed = started.elapsed();
        info!(
            output = %output.display(),
            bytes = output_size,
            elapsed_ms = elapsed.as_millis() as u64,
            "Download complete"
        );

        Ok(SessionReport {
            output,
            stats,
            elapsed,
            output_size,
        })
    }
}

/// The output name must be a single plain path component.
fn validate_name(name: &str) -> Result<(), DownloadError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(()),
        _ => Err(DownloadError::configuration(format!(
            "invalid output name `{name}`"
        ))),
    }
}
