use std::path::PathBuf;

use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("download cancelled")]
    Cancelled,

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("playlist is empty")]
    ParseEmpty,

    #[error("no segments found in playlist")]
    ParseNoSegments,

    #[error("failed to fetch decryption key from {url}: {reason}")]
    KeyFetchFailed { url: String, reason: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} for {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("fetch of {url} failed after {attempts} attempts: {reason}")]
    FetchFailed {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("empty payload received for {url}")]
    EmptyPayload { url: String },

    #[error("decryption error: {reason}")]
    DecryptFailed { reason: String, retryable: bool },

    #[error("failed to write {}: {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create directory {}: {source}", path.display())]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "incomplete download: expected {expected}, succeeded {succeeded}, skipped {skipped}, failed {failed}, allowed loss {allowed:.0}"
    )]
    IncompleteDownload {
        expected: usize,
        succeeded: usize,
        skipped: usize,
        failed: usize,
        allowed: f64,
    },

    #[error("assembler `{program}` is not available: {reason}")]
    AssemblerUnavailable { program: String, reason: String },

    #[error("assembly failed: {reason}")]
    AssemblyFailed { reason: String },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl DownloadError {
    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn http_status(status: StatusCode, url: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
        }
    }

    pub fn decrypt(reason: impl Into<String>) -> Self {
        Self::DecryptFailed {
            reason: reason.into(),
            retryable: true,
        }
    }

    /// A decryption failure that another attempt cannot fix (missing key, unsupported method).
    pub fn decrypt_fatal(reason: impl Into<String>) -> Self {
        Self::DecryptFailed {
            reason: reason.into(),
            retryable: false,
        }
    }

    pub fn assembly(reason: impl Into<String>) -> Self {
        Self::AssemblyFailed {
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Cancelled
            | Self::InvalidUrl { .. }
            | Self::ParseEmpty
            | Self::ParseNoSegments
            | Self::FetchFailed { .. }
            | Self::WriteFailed { .. }
            | Self::DirectoryCreate { .. }
            | Self::IncompleteDownload { .. }
            | Self::AssemblerUnavailable { .. }
            | Self::AssemblyFailed { .. }
            | Self::Configuration { .. } => false,
            // Every non-success status is retried, including 4xx.
            Self::HttpStatus { .. } => true,
            Self::DecryptFailed { retryable, .. } => *retryable,
            Self::Network { .. }
            | Self::KeyFetchFailed { .. }
            | Self::EmptyPayload { .. }
            | Self::Io { .. } => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_is_retryable() {
        let err = DownloadError::http_status(StatusCode::NOT_FOUND, "http://a/b.ts");
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "request failed with HTTP 404 Not Found for http://a/b.ts"
        );
    }

    #[test]
    fn fatal_decryption_is_not_retryable() {
        assert!(DownloadError::decrypt("bad padding").is_retryable());
        assert!(!DownloadError::decrypt_fatal("key unavailable").is_retryable());
    }

    #[test]
    fn incomplete_download_reports_counts() {
        let err = DownloadError::IncompleteDownload {
            expected: 100,
            succeeded: 80,
            skipped: 5,
            failed: 15,
            allowed: 10.0,
        };
        let message = err.to_string();
        assert!(message.contains("expected 100"));
        assert!(message.contains("succeeded 80"));
        assert!(message.contains("allowed loss 10"));
    }
}
