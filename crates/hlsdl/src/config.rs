use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;

use crate::error::DownloadError;
use crate::resolver::HostMode;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_13_6) AppleWebKit/537.36";

/// Default number of segments downloaded at the same time.
pub const DEFAULT_CONCURRENCY: usize = 24;

/// Hard upper bound for `DownloadConfig::concurrency`.
pub const MAX_CONCURRENCY: usize = 256;

/// Options of the HTTP fetch port
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Timeout applied to every individual request attempt
    pub timeout: Duration,

    /// Maximum attempts per request (network errors and non-success statuses)
    pub max_retries: u32,

    /// Backoff unit; attempt `n` waits `(n - 1) * retry_delay` before running
    pub retry_delay: Duration,

    /// User agent string
    pub user_agent: String,

    /// Custom HTTP headers, merged over the defaults
    pub headers: HeaderMap,

    /// Raw `Cookie` header value sent with every request
    pub cookie: Option<String>,

    pub danger_accept_invalid_certs: bool, // For reqwest's `danger_accept_invalid_certs`
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_retries: 5,
            retry_delay: Duration::from_secs(1),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: FetchConfig::get_default_headers(),
            cookie: None,
            danger_accept_invalid_certs: false,
        }
    }
}

impl FetchConfig {
    pub fn with_config(config: FetchConfig) -> Self {
        let mut headers = FetchConfig::get_default_headers();

        // Custom headers take precedence over defaults for the same fields
        for (name, value) in config.headers.iter() {
            headers.insert(name.clone(), value.clone());
        }

        Self { headers, ..config }
    }

    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        default_headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );

        default_headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));

        default_headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.9, en;q=0.8, de;q=0.7, *;q=0.5"),
        );
        default_headers
    }

    /// Headers sent with each request: the merged header map plus the cookie, if any.
    pub fn request_headers(&self) -> Result<HeaderMap, DownloadError> {
        let mut headers = self.headers.clone();
        if let Some(cookie) = self.cookie.as_deref().filter(|c| !c.is_empty()) {
            let value = HeaderValue::from_str(cookie).map_err(|e| {
                DownloadError::configuration(format!("invalid cookie header: {e}"))
            })?;
            headers.insert(reqwest::header::COOKIE, value);
        }
        Ok(headers)
    }
}

/// Options of a single download run
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Number of segments fetched concurrently (1..=256)
    pub concurrency: usize,

    /// How relative segment references are joined to the playlist location
    pub host_mode: HostMode,

    /// Fraction of segments allowed to be missing, in `[0, 1)`
    pub loss_tolerance: f64,

    /// Parent directory of the segment directory and the final output.
    /// `None` means the current working directory.
    pub save_path: Option<PathBuf>,

    /// Remove the segment directory after a successful assembly
    pub auto_clean: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            host_mode: HostMode::default(),
            loss_tolerance: 0.1,
            save_path: None,
            auto_clean: true,
        }
    }
}

/// Which assembler joins the downloaded segments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssemblyStrategy {
    /// Remux through `ffmpeg -f concat`
    #[default]
    Ffmpeg,
    /// Plain byte concatenation of the segment files
    Concat,
}

#[derive(Debug, Clone)]
pub struct AssemblyConfig {
    pub strategy: AssemblyStrategy,
    pub ffmpeg_path: String,
    /// Output options passed to ffmpeg after the concat input
    pub ffmpeg_options: Vec<String>,
    /// Extension of the assembled output file
    pub output_extension: String,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            strategy: AssemblyStrategy::default(),
            ffmpeg_path: "ffmpeg".to_owned(),
            ffmpeg_options: vec!["-c".to_owned(), "copy".to_owned(), "-y".to_owned()],
            output_extension: "mp4".to_owned(),
        }
    }
}

// --- Top-Level Configuration ---
#[derive(Debug, Clone, Default)]
pub struct HlsdlConfig {
    pub fetch: FetchConfig,
    pub download: DownloadConfig,
    pub assembly: AssemblyConfig,
}

impl HlsdlConfig {
    pub fn validate(&self) -> Result<(), DownloadError> {
        if self.download.concurrency == 0 || self.download.concurrency > MAX_CONCURRENCY {
            return Err(DownloadError::configuration(format!(
                "concurrency must be between 1 and {MAX_CONCURRENCY}, got {}",
                self.download.concurrency
            )));
        }

        if self.fetch.timeout.is_zero() {
            return Err(DownloadError::configuration(
                "request timeout must be greater than zero",
            ));
        }

        if self.fetch.max_retries == 0 {
            return Err(DownloadError::configuration(
                "at least one request attempt is required",
            ));
        }

        let tolerance = self.download.loss_tolerance;
        if !(0.0..1.0).contains(&tolerance) {
            return Err(DownloadError::configuration(format!(
                "loss tolerance must be in [0, 1), got {tolerance}"
            )));
        }

        if self.assembly.output_extension.is_empty() {
            return Err(DownloadError::configuration(
                "output extension must not be empty",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = HlsdlConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.download.concurrency, 24);
        assert_eq!(config.fetch.max_retries, 5);
        assert_eq!(config.fetch.timeout, Duration::from_secs(5));
    }

    #[test]
    fn rejects_out_of_range_concurrency() {
        let mut config = HlsdlConfig::default();
        config.download.concurrency = 0;
        assert!(config.validate().is_err());
        config.download.concurrency = 257;
        assert!(config.validate().is_err());
        config.download.concurrency = 256;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_loss_tolerance_of_one() {
        let mut config = HlsdlConfig::default();
        config.download.loss_tolerance = 1.0;
        assert!(config.validate().is_err());
        config.download.loss_tolerance = -0.1;
        assert!(config.validate().is_err());
        config.download.loss_tolerance = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn custom_headers_override_defaults() {
        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("video/mp2t"));
        headers.insert("x-token", HeaderValue::from_static("abc"));

        let config = FetchConfig::with_config(FetchConfig {
            headers,
            ..FetchConfig::default()
        });

        assert_eq!(config.headers[reqwest::header::ACCEPT], "video/mp2t");
        assert_eq!(config.headers["x-token"], "abc");
        assert_eq!(config.headers[reqwest::header::CONNECTION], "keep-alive");
    }

    #[test]
    fn cookie_is_added_to_request_headers() {
        let config = FetchConfig {
            cookie: Some("session=abc123".to_owned()),
            ..FetchConfig::default()
        };
        let headers = config.request_headers().unwrap();
        assert_eq!(headers[reqwest::header::COOKIE], "session=abc123");

        let no_cookie = FetchConfig::default().request_headers().unwrap();
        assert!(!no_cookie.contains_key(reqwest::header::COOKIE));
    }
}
