use std::path::PathBuf;

use clap::Parser;
use hlsdl_engine::{HostMode, MAX_CONCURRENCY};

#[derive(Debug, Parser)]
#[command(
    name = "hlsdl",
    version,
    about = "Download a segmented (m3u8) playlist and assemble it into a single file"
)]
pub struct Args {
    /// Playlist URL (http:// or https://)
    #[arg(value_name = "URL", conflicts_with = "url_flag")]
    pub url: Option<String>,

    /// Playlist URL, alternative to the positional argument
    #[arg(short = 'u', long = "url", value_name = "URL")]
    pub url_flag: Option<String>,

    /// Number of segments downloaded concurrently (1-256) [default: 24]
    #[arg(short = 'n', long, value_parser = parse_concurrency)]
    pub concurrency: Option<usize>,

    /// How relative segment paths are joined to the playlist URL
    #[arg(long, visible_alias = "ht", value_enum)]
    pub host_mode: Option<HostMode>,

    /// Output name, without extension
    #[arg(short = 'o', long, default_value = "movie")]
    pub output: String,

    /// Cookie header sent with every request
    #[arg(short = 'c', long)]
    pub cookie: Option<String>,

    /// Accept invalid TLS certificates
    #[arg(short = 's', long)]
    pub insecure: bool,

    /// Directory the segments and the output are saved in [default: current directory]
    #[arg(long, visible_alias = "sp", value_name = "DIR")]
    pub save_path: Option<PathBuf>,

    /// Keep the segment directory after assembly
    #[arg(long)]
    pub keep_segments: bool,

    /// Fraction of segments allowed to be missing, in [0, 1)
    #[arg(long, value_name = "FRACTION")]
    pub loss_tolerance: Option<f64>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Maximum attempts per request
    #[arg(long)]
    pub retries: Option<u32>,

    /// Extra request header, repeatable
    #[arg(short = 'H', long = "header", value_name = "KEY=VALUE")]
    pub headers: Vec<String>,

    #[arg(long)]
    pub user_agent: Option<String>,

    /// Path to the ffmpeg binary
    #[arg(long, value_name = "PATH")]
    pub ffmpeg: Option<String>,

    /// Join segments by plain concatenation instead of ffmpeg
    #[arg(long)]
    pub concat: bool,

    /// TOML config file [default: <config dir>/hlsdl/config.toml when present]
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// The playlist URL from either the positional argument or `-u`.
    pub fn playlist_url(&self) -> Option<&str> {
        self.url.as_deref().or(self.url_flag.as_deref())
    }
}

fn parse_concurrency(value: &str) -> Result<usize, String> {
    let n: usize = value
        .parse()
        .map_err(|_| format!("`{value}` is not a number"))?;
    if n == 0 || n > MAX_CONCURRENCY {
        return Err(format!("must be between 1 and {MAX_CONCURRENCY}"));
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_short_flags() {
        let args = Args::try_parse_from([
            "hlsdl",
            "-u",
            "https://example.com/index.m3u8",
            "-n",
            "8",
            "--ht",
            "v2",
            "-o",
            "show",
            "-s",
            "-H",
            "Referer=https://example.com",
        ])
        .unwrap();

        assert_eq!(args.playlist_url(), Some("https://example.com/index.m3u8"));
        assert_eq!(args.concurrency, Some(8));
        assert_eq!(args.host_mode, Some(HostMode::AuthorityOnly));
        assert_eq!(args.output, "show");
        assert!(args.insecure);
        assert_eq!(args.headers, ["Referer=https://example.com"]);
    }

    #[test]
    fn positional_url_and_defaults() {
        let args = Args::try_parse_from(["hlsdl", "https://example.com/a.m3u8"]).unwrap();
        assert_eq!(args.playlist_url(), Some("https://example.com/a.m3u8"));
        assert_eq!(args.output, "movie");
        assert_eq!(args.concurrency, None);
        assert!(!args.keep_segments);
    }

    #[test]
    fn rejects_out_of_range_concurrency() {
        assert!(Args::try_parse_from(["hlsdl", "-n", "0", "http://a/b.m3u8"]).is_err());
        assert!(Args::try_parse_from(["hlsdl", "-n", "257", "http://a/b.m3u8"]).is_err());
    }
}
