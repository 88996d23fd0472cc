// Segment Processor: fetch, decrypt, normalize and persist one segment.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::decryption::{decrypt_segment, strip_leading_padding};
use crate::error::DownloadError;
use crate::fetcher::Fetcher;
use crate::manifest::{EncryptionDescriptor, SegmentDescriptor};
use crate::retry::{RetryAction, RetryPolicy, retry_with_backoff};

/// Terminal state of one segment.
#[derive(Debug)]
pub enum SegmentOutcome {
    /// Fetched and written in this run
    Downloaded { bytes: u64 },
    /// A non-empty file with the segment's name already existed
    Skipped,
    Failed(DownloadError),
}

impl SegmentOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, SegmentOutcome::Failed(_))
    }
}

#[derive(Clone)]
pub struct SegmentProcessor {
    fetcher: Arc<dyn Fetcher>,
    policy: RetryPolicy,
    token: CancellationToken,
}

impl SegmentProcessor {
    pub fn new(fetcher: Arc<dyn Fetcher>, policy: RetryPolicy, token: CancellationToken) -> Self {
        Self {
            fetcher,
            policy,
            token,
        }
    }

    /// Bring `descriptor` to disk under `target_dir`.
    ///
    /// Never returns an error: every failure is folded into [`SegmentOutcome::Failed`].
    pub async fn process(
        &self,
        descriptor: &SegmentDescriptor,
        target_dir: &Path,
        encryption: Option<&EncryptionDescriptor>,
    ) -> SegmentOutcome {
        let path = target_dir.join(&descriptor.name);

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => {
                debug!(segment = %descriptor.name, "Segment already on disk, skipping");
                return SegmentOutcome::Skipped;
            }
            Ok(meta) if meta.is_file() => {
                // Zero-length leftovers are not trusted.
                debug!(segment = %descriptor.name, "Removing empty segment file");
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    return SegmentOutcome::Failed(DownloadError::WriteFailed { path, source: e });
                }
            }
            _ => {}
        }

        let payload = match self.acquire(descriptor, encryption).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(segment = %descriptor.name, url = %descriptor.source_url, error = %e, "Segment failed");
                return SegmentOutcome::Failed(e);
            }
        };

        match persist(&path, &payload).await {
            Ok(()) => {
                trace!(segment = %descriptor.name, bytes = payload.len(), "Segment written");
                SegmentOutcome::Downloaded {
                    bytes: payload.len() as u64,
                }
            }
            Err(e) => {
                warn!(segment = %descriptor.name, error = %e, "Failed to write segment");
                SegmentOutcome::Failed(e)
            }
        }
    }

    /// Fetch, decrypt and normalize the payload, retrying empty payloads and
    /// decryption failures under the shared policy.
    async fn acquire(
        &self,
        descriptor: &SegmentDescriptor,
        encryption: Option<&EncryptionDescriptor>,
    ) -> Result<Bytes, DownloadError> {
        let url = descriptor.source_url.as_str();
        let headers = HeaderMap::new();

        retry_with_backoff(&self.policy, &self.token, |_| {
            let headers = &headers;
            async move {
                // The fetcher already retried transport failures.
                let data = match self.fetcher.fetch(url, headers).await {
                    Ok(data) => data,
                    Err(e) => return RetryAction::Fail(e),
                };

                if data.is_empty() {
                    return RetryAction::Retry(DownloadError::EmptyPayload {
                        url: url.to_owned(),
                    });
                }

                let data = match encryption {
                    Some(enc) => match decrypt_segment(data, enc).await {
                        Ok(plain) => plain,
                        Err(e) if e.is_retryable() => return RetryAction::Retry(e),
                        Err(e) => return RetryAction::Fail(e),
                    },
                    None => data,
                };

                RetryAction::Success(strip_leading_padding(data))
            }
        })
        .await
    }
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Write to `<path>.part` and rename, so a partial write never carries the final name.
async fn persist(path: &Path, data: &[u8]) -> Result<(), DownloadError> {
    let tmp = part_path(path);
    let write_failed = |source| DownloadError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Err(e) = tokio::fs::write(&tmp, data).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(write_failed(e));
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(write_failed(e));
    }
    Ok(())
}
