use bytes::Bytes;

use crate::error::DownloadError;

/// Width of the zero-padded ordinal in segment file names.
pub const SEGMENT_NAME_WIDTH: usize = 5;

/// Extension of persisted segment files.
pub const SEGMENT_EXTENSION: &str = "ts";

/// Default method when a key directive carries no `METHOD` attribute.
pub const DEFAULT_KEY_METHOD: &str = "AES-128";

/// File name for the 1-based `ordinal`, e.g. `00001.ts`.
///
/// Lexicographic order of these names equals playlist order.
pub fn segment_name(ordinal: usize) -> String {
    format!("{ordinal:0width$}.{SEGMENT_EXTENSION}", width = SEGMENT_NAME_WIDTH)
}

/// One media segment of the playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentDescriptor {
    pub name: String,
    pub source_url: String,
    /// Duration in seconds from the preceding `#EXTINF` tag
    pub duration: Option<f64>,
}

impl SegmentDescriptor {
    pub fn new(ordinal: usize, source_url: impl Into<String>) -> Self {
        Self {
            name: segment_name(ordinal),
            source_url: source_url.into(),
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: Option<f64>) -> Self {
        self.duration = duration;
        self
    }
}

/// Encryption parameters shared by every segment of the playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptionDescriptor {
    pub method: String,
    pub key_url: String,
    /// Raw key bytes; empty when the key could not be fetched
    pub key: Bytes,
    /// Explicit IV from the directive. Without one the key doubles as IV.
    pub iv: Option<[u8; 16]>,
}

impl EncryptionDescriptor {
    pub fn has_key(&self) -> bool {
        !self.key.is_empty()
    }
}

/// Parsed playlist: a non-empty, ordered list of segments and an optional key.
#[derive(Debug, Clone)]
pub struct Manifest {
    segments: Vec<SegmentDescriptor>,
    key: Option<EncryptionDescriptor>,
}

impl Manifest {
    pub fn new(
        segments: Vec<SegmentDescriptor>,
        key: Option<EncryptionDescriptor>,
    ) -> Result<Self, DownloadError> {
        if segments.is_empty() {
            return Err(DownloadError::ParseNoSegments);
        }
        Ok(Self { segments, key })
    }

    pub fn segments(&self) -> &[SegmentDescriptor] {
        &self.segments
    }

    pub fn key(&self) -> Option<&EncryptionDescriptor> {
        self.key.as_ref()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Sum of the known segment durations, in seconds.
    pub fn total_duration(&self) -> f64 {
        self.segments.iter().filter_map(|s| s.duration).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_zero_padded_and_sort_in_order() {
        assert_eq!(segment_name(1), "00001.ts");
        assert_eq!(segment_name(42), "00042.ts");
        let mut names: Vec<_> = [10, 2, 100, 1].into_iter().map(segment_name).collect();
        names.sort();
        assert_eq!(names, ["00001.ts", "00002.ts", "00010.ts", "00100.ts"]);
    }

    #[test]
    fn empty_manifest_is_rejected() {
        assert!(matches!(
            Manifest::new(Vec::new(), None),
            Err(DownloadError::ParseNoSegments)
        ));
    }

    #[test]
    fn total_duration_skips_unknown() {
        let manifest = Manifest::new(
            vec![
                SegmentDescriptor::new(1, "http://a/1.ts").with_duration(Some(4.0)),
                SegmentDescriptor::new(2, "http://a/2.ts"),
                SegmentDescriptor::new(3, "http://a/3.ts").with_duration(Some(2.5)),
            ],
            None,
        )
        .unwrap();
        assert_eq!(manifest.len(), 3);
        assert!((manifest.total_duration() - 6.5).abs() < f64::EPSILON);
    }
}
