// File configuration: optional TOML defaults, overridden by command-line flags.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hlsdl_engine::{AssemblyStrategy, FetchConfig, HlsdlConfig, HostMode};
use serde::Deserialize;
use tracing::debug;

use crate::cli::Args;
use crate::error::{AppError, Result};
use crate::params::parse_headers;

const CONFIG_DIR_NAME: &str = "hlsdl";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Contents of the TOML config file. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub concurrency: Option<usize>,
    pub host_mode: Option<HostMode>,
    pub save_path: Option<PathBuf>,
    pub auto_clean: Option<bool>,
    pub loss_tolerance: Option<f64>,
    pub timeout_secs: Option<u64>,
    pub retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub user_agent: Option<String>,
    pub cookie: Option<String>,
    pub insecure: Option<bool>,
    pub headers: BTreeMap<String, String>,
    pub assembly: FileAssemblyConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileAssemblyConfig {
    pub strategy: Option<AssemblyStrategy>,
    pub ffmpeg_path: Option<String>,
    pub ffmpeg_options: Option<Vec<String>>,
    pub output_extension: Option<String>,
}

impl FileConfig {
    /// Load the explicit `path`, or the default location when it exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match default_path().filter(|p| p.is_file()) {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };

        debug!(path = %path.display(), "Loading config file");
        let text = std::fs::read_to_string(&path).map_err(|e| {
            AppError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Layer the defaults, the file config and the command-line flags, in that order.
pub fn build_config(file: FileConfig, args: &Args) -> Result<HlsdlConfig> {
    let mut config = HlsdlConfig::default();

    // Download
    let download = &mut config.download;
    if let Some(n) = args.concurrency.or(file.concurrency) {
        download.concurrency = n;
    }
    if let Some(mode) = args.host_mode.or(file.host_mode) {
        download.host_mode = mode;
    }
    if let Some(tolerance) = args.loss_tolerance.or(file.loss_tolerance) {
        download.loss_tolerance = tolerance;
    }
    download.save_path = args.save_path.clone().or(file.save_path);
    download.auto_clean = !args.keep_segments && file.auto_clean.unwrap_or(true);

    // Fetch
    let mut headers = Vec::with_capacity(file.headers.len() + args.headers.len());
    headers.extend(file.headers.iter().map(|(k, v)| format!("{k}={v}")));
    headers.extend(args.headers.iter().cloned());

    let fetch = &mut config.fetch;
    if let Some(secs) = args.timeout.or(file.timeout_secs) {
        fetch.timeout = Duration::from_secs(secs);
    }
    if let Some(retries) = args.retries.or(file.retries) {
        fetch.max_retries = retries;
    }
    if let Some(ms) = file.retry_delay_ms {
        fetch.retry_delay = Duration::from_millis(ms);
    }
    if let Some(ua) = args.user_agent.clone().or(file.user_agent) {
        fetch.user_agent = ua;
    }
    fetch.cookie = args.cookie.clone().or(file.cookie);
    fetch.danger_accept_invalid_certs = args.insecure || file.insecure.unwrap_or(false);
    fetch.headers = parse_headers(&headers)?;
    config.fetch = FetchConfig::with_config(config.fetch);

    // Assembly
    let assembly = &mut config.assembly;
    if args.concat {
        assembly.strategy = AssemblyStrategy::Concat;
    } else if let Some(strategy) = file.assembly.strategy {
        assembly.strategy = strategy;
    }
    if let Some(path) = args.ffmpeg.clone().or(file.assembly.ffmpeg_path) {
        assembly.ffmpeg_path = path;
    }
    if let Some(options) = file.assembly.ffmpeg_options {
        assembly.ffmpeg_options = options;
    }
    if let Some(ext) = file.assembly.output_extension {
        assembly.output_extension = ext.trim_start_matches('.').to_owned();
    }

    config.validate()?;
    Ok(config)
}
