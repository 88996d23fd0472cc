// Segmented playlist (m3u8) downloader engine

pub mod assembly;
pub mod config;
pub mod coordinator;
pub mod decryption;
pub mod error;
pub mod fetcher;
pub mod files;
pub mod gate;
pub mod manifest;
pub mod playlist;
pub mod processor;
pub mod progress;
pub mod resolver;
pub mod retry;
pub mod session;

// Re-exports for easier access
pub use assembly::{Assembler, ConcatAssembler, FfmpegAssembler, assembler_for};
pub use config::{
    AssemblyConfig, AssemblyStrategy, DownloadConfig, FetchConfig, HlsdlConfig,
    DEFAULT_CONCURRENCY, MAX_CONCURRENCY,
};
pub use coordinator::{DownloadCoordinator, DownloadStats};
pub use error::DownloadError;
pub use fetcher::{Fetcher, HttpFetcher};
pub use gate::{acceptable, ensure_complete};
pub use manifest::{EncryptionDescriptor, Manifest, SegmentDescriptor};
pub use playlist::{PlaylistParser, load_manifest};
pub use processor::{SegmentOutcome, SegmentProcessor};
pub use progress::{NoopProgress, ProgressSink, ProgressSnapshot, SpanProgress};
pub use resolver::{HostMode, resolve_host, resolve_segment};
pub use retry::RetryPolicy;
pub use session::{DownloadSession, SessionReport};
