//! Segment reference resolution.
//!
//! Playlists reference segments either by absolute URL or by a path that is
//! relative to some "host" prefix derived from the playlist URL. Which prefix
//! applies cannot be inferred from the playlist, so it is a user choice
//! ([`HostMode`]).

use serde::Deserialize;
use url::Url;

use crate::error::DownloadError;

/// How the base host is derived from the playlist URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum HostMode {
    /// `scheme://authority` + directory of the playlist path
    #[default]
    #[serde(alias = "v1")]
    #[cfg_attr(feature = "clap", value(alias = "v1"))]
    PathPreserving,
    /// `scheme://authority` only, for references rooted at the document root
    #[serde(alias = "v2")]
    #[cfg_attr(feature = "clap", value(alias = "v2"))]
    AuthorityOnly,
}

impl std::fmt::Display for HostMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostMode::PathPreserving => write!(f, "path-preserving"),
            HostMode::AuthorityOnly => write!(f, "authority-only"),
        }
    }
}

/// Derive the base host segment references are joined to.
///
/// The returned string never ends with a `/`.
pub fn resolve_host(manifest_url: &str, mode: HostMode) -> Result<String, DownloadError> {
    let url = Url::parse(manifest_url)
        .map_err(|e| DownloadError::invalid_url(manifest_url, e.to_string()))?;

    let Some(host) = url.host_str() else {
        return Err(DownloadError::invalid_url(
            manifest_url,
            "URL has no host",
        ));
    };

    let mut base = match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    };

    if mode == HostMode::PathPreserving {
        let path = url.path();
        if let Some(idx) = path.rfind('/') {
            base.push_str(&path[..idx]);
        }
    }

    Ok(base)
}

/// Turn a raw playlist line into an absolute fetch address.
pub fn resolve_segment(raw_ref: &str, host: &str) -> String {
    let raw_ref = raw_ref.trim();
    if has_scheme(raw_ref) {
        return raw_ref.to_owned();
    }

    // Protocol-relative reference: borrow the scheme of the host.
    if let Some(rest) = raw_ref.strip_prefix("//")
        && let Some((scheme, _)) = host.split_once("://")
    {
        return format!("{scheme}://{rest}");
    }

    format!(
        "{}/{}",
        host.trim_end_matches('/'),
        raw_ref.trim_start_matches('/')
    )
}

/// Whether `reference` starts with `scheme://` (RFC 3986 scheme characters).
fn has_scheme(reference: &str) -> bool {
    let Some((scheme, _)) = reference.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_preserving_keeps_directory() {
        let host = resolve_host(
            "https://cdn.example.com/vod/show/index.m3u8?token=1",
            HostMode::PathPreserving,
        )
        .unwrap();
        assert_eq!(host, "https://cdn.example.com/vod/show");
    }

    #[test]
    fn authority_only_drops_path() {
        let host = resolve_host(
            "https://cdn.example.com:8443/vod/show/index.m3u8",
            HostMode::AuthorityOnly,
        )
        .unwrap();
        assert_eq!(host, "https://cdn.example.com:8443");
    }

    #[test]
    fn root_playlist_has_no_trailing_slash() {
        let host = resolve_host("http://example.com/index.m3u8", HostMode::PathPreserving).unwrap();
        assert_eq!(host, "http://example.com");
    }

    #[test]
    fn rejects_relative_and_hostless_urls() {
        assert!(matches!(
            resolve_host("/vod/index.m3u8", HostMode::PathPreserving),
            Err(DownloadError::InvalidUrl { .. })
        ));
        assert!(matches!(
            resolve_host("mailto:someone@example.com", HostMode::AuthorityOnly),
            Err(DownloadError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn relative_reference_joins_with_single_separator() {
        assert_eq!(
            resolve_segment("/seg/001.ts", "http://example.com/vod"),
            "http://example.com/vod/seg/001.ts"
        );
        assert_eq!(
            resolve_segment("001.ts", "http://example.com/vod/"),
            "http://example.com/vod/001.ts"
        );
    }

    #[test]
    fn absolute_reference_is_unchanged_and_idempotent() {
        let host = "http://example.com/vod";
        for raw in [
            "https://other.example.com/a/001.ts?sig=x",
            "http://example.com/vod/002.ts",
        ] {
            let once = resolve_segment(raw, host);
            assert_eq!(once, raw);
            assert_eq!(resolve_segment(&once, host), once);
        }
    }

    #[test]
    fn protocol_relative_reference_uses_host_scheme() {
        assert_eq!(
            resolve_segment("//cdn.example.com/001.ts", "https://example.com/vod"),
            "https://cdn.example.com/001.ts"
        );
    }

    #[test]
    fn scheme_detection() {
        assert!(has_scheme("http://a"));
        assert!(has_scheme("svc+https://a"));
        assert!(!has_scheme("segment-1.ts"));
        assert!(!has_scheme("1http://a"));
        assert!(!has_scheme("path/with://inside"));
    }
}
