// Playlist parsing: turns flat m3u8 text into an ordered list of segment descriptors.

use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use tracing::{debug, info, warn};

use crate::error::DownloadError;
use crate::fetcher::Fetcher;
use crate::manifest::{DEFAULT_KEY_METHOD, EncryptionDescriptor, Manifest, SegmentDescriptor};
use crate::resolver::{HostMode, resolve_host, resolve_segment};

const KEY_TAG: &str = "#EXT-X-KEY";
const INF_TAG: &str = "#EXTINF:";
const VARIANT_TAG: &str = "#EXT-X-STREAM-INF";

/// A parsed `#EXT-X-KEY` directive, before the key itself is fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyDirective {
    pub method: String,
    pub uri: String,
    pub iv: Option<[u8; 16]>,
}

pub struct PlaylistParser {
    fetcher: Arc<dyn Fetcher>,
}

impl PlaylistParser {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    /// Parse playlist text. Relative references are joined to `base_host`.
    pub async fn parse(&self, raw: &str, base_host: &str) -> Result<Manifest, DownloadError> {
        if raw.is_empty() {
            return Err(DownloadError::ParseEmpty);
        }

        let mut segments = Vec::new();
        let mut key = None;
        let mut pending_duration = None;
        let mut variant_warned = false;

        let raw = raw.strip_prefix('\u{FEFF}').unwrap_or(raw);
        for line in raw.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                if line.contains(KEY_TAG) {
                    match parse_key_directive(line) {
                        Ok(Some(directive)) => {
                            key = Some(self.fetch_key(directive, base_host).await);
                        }
                        Ok(None) => debug!("Ignoring METHOD=NONE key directive"),
                        Err(reason) => warn!(line, reason, "Ignoring malformed key directive"),
                    }
                } else if let Some(rest) = line.strip_prefix(INF_TAG) {
                    pending_duration = parse_duration(rest);
                } else if line.starts_with(VARIANT_TAG) && !variant_warned {
                    variant_warned = true;
                    warn!(
                        "Master playlists are not supported; variant entries are treated as segments. \
                         Pass the URL of a media playlist instead."
                    );
                }
                continue;
            }

            let ordinal = segments.len() + 1;
            let source_url = resolve_segment(line, base_host);
            segments.push(
                SegmentDescriptor::new(ordinal, source_url).with_duration(pending_duration.take()),
            );
        }

        if segments.is_empty() {
            return Err(DownloadError::ParseNoSegments);
        }

        info!(segments = segments.len(), encrypted = key.is_some(), "Parsed playlist");
        Manifest::new(segments, key)
    }

    /// Resolve and fetch the key. A failed fetch keeps the descriptor with empty key bytes.
    async fn fetch_key(&self, directive: KeyDirective, base_host: &str) -> EncryptionDescriptor {
        let key_url = resolve_segment(&directive.uri, base_host);
        let key = match self.fetcher.fetch(&key_url, &HeaderMap::new()).await {
            Ok(bytes) => {
                if bytes.len() != 16 {
                    warn!(
                        url = %key_url,
                        len = bytes.len(),
                        "Decryption key has unexpected length (expected 16 bytes)"
                    );
                }
                info!(url = %key_url, "Fetched decryption key");
                bytes
            }
            Err(e) => {
                let err = DownloadError::KeyFetchFailed {
                    url: key_url.clone(),
                    reason: e.to_string(),
                };
                warn!(error = %err, "Continuing without key; segments will fail to decrypt");
                Bytes::new()
            }
        };

        EncryptionDescriptor {
            method: directive.method,
            key_url,
            key,
            iv: directive.iv,
        }
    }
}

/// Fetch the playlist at `url` and parse it.
pub async fn load_manifest(
    url: &str,
    host_mode: HostMode,
    fetcher: Arc<dyn Fetcher>,
) -> Result<Manifest, DownloadError> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(DownloadError::invalid_url(
            url,
            "playlist URL must start with http:// or https://",
        ));
    }

    let base_host = resolve_host(url, host_mode)?;
    info!(url, host = %base_host, mode = %host_mode, "Fetching playlist");

    let body = fetcher.fetch(url, &HeaderMap::new()).await?;
    let text = String::from_utf8_lossy(&body);

    PlaylistParser::new(fetcher).parse(&text, &base_host).await
}

/// Parse the attributes of a key directive line.
///
/// Returns `Ok(None)` for `METHOD=NONE` and `Err` when the quoted URI is missing.
pub fn parse_key_directive(line: &str) -> Result<Option<KeyDirective>, &'static str> {
    let attributes = line
        .split_once(':')
        .map(|(_, attrs)| attrs)
        .unwrap_or_default();

    let mut method = None;
    let mut uri = None;
    let mut iv = None;

    for (name, value) in parse_attributes(attributes) {
        match name {
            "METHOD" => method = Some(value.trim_matches('"').to_owned()),
            "URI" => {
                let quoted = value.len() >= 2 && value.starts_with('"') && value.ends_with('"');
                if quoted {
                    uri = Some(value[1..value.len() - 1].to_owned());
                }
            }
            "IV" => match parse_iv(value) {
                Some(bytes) => iv = Some(bytes),
                None => warn!(iv = value, "Ignoring malformed IV attribute"),
            },
            _ => {}
        }
    }

    let method = method.unwrap_or_else(|| DEFAULT_KEY_METHOD.to_owned());
    if method.eq_ignore_ascii_case("NONE") {
        return Ok(None);
    }

    let uri = uri.filter(|u| !u.is_empty()).ok_or("quoted URI attribute not found")?;
    Ok(Some(KeyDirective { method, uri, iv }))
}

/// Split an attribute list on commas that are not inside quotes.
fn parse_attributes(input: &str) -> Vec<(&str, &str)> {
    let mut attributes = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;

    for (idx, c) in input.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                push_attribute(&mut attributes, &input[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    push_attribute(&mut attributes, &input[start..]);
    attributes
}

fn push_attribute<'a>(attributes: &mut Vec<(&'a str, &'a str)>, raw: &'a str) {
    if let Some((name, value)) = raw.split_once('=') {
        attributes.push((name.trim(), value.trim()));
    }
}

fn parse_iv(value: &str) -> Option<[u8; 16]> {
    let hex_str = value
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    let mut iv = [0u8; 16];
    hex::decode_to_slice(hex_str, &mut iv).ok()?;
    Some(iv)
}

fn parse_duration(rest: &str) -> Option<f64> {
    let value = rest.split(',').next()?.trim();
    value.parse::<f64>().ok().filter(|d| d.is_finite() && *d >= 0.0)
}
