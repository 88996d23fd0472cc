mod cli;
mod config;
mod error;
mod params;

use std::process;

use clap::Parser;
use hlsdl_engine::{DownloadSession, NoopProgress, ProgressSink, SpanProgress};
use indicatif::{HumanBytes, HumanDuration};
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::cli::Args;
use crate::config::{FileConfig, build_config};
use crate::error::{AppError, Result};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(args).await {
        error!("{e}");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let url = args
        .playlist_url()
        .ok_or_else(|| AppError::InvalidInput("a playlist URL is required (see --help)".into()))?
        .to_owned();
    if args.output.trim().is_empty() {
        return Err(AppError::InvalidInput("output name must not be empty".into()));
    }

    let file_config = FileConfig::load(args.config.as_deref())?;
    let config = build_config(file_config, &args)?;
    info!(
        concurrency = config.download.concurrency,
        host_mode = %config.download.host_mode,
        "Configuration loaded"
    );

    let token = CancellationToken::new();
    spawn_ctrl_c_handler(token.clone());

    let session = DownloadSession::new(config, token)?;
    let mut progress: Box<dyn ProgressSink> = if args.quiet {
        Box::new(NoopProgress)
    } else {
        Box::new(SpanProgress::new(&args.output))
    };

    let report = session.run(&url, &args.output, progress.as_mut()).await?;

    if !args.quiet {
        println!(
            "Saved {} ({}, {} segments) in {}",
            report.output.display(),
            HumanBytes(report.output_size),
            report.stats.total,
            HumanDuration(report.elapsed)
        );
    }
    Ok(())
}

/// Cancel `token` on the first Ctrl-C. Running requests finish; no new attempt starts.
fn spawn_ctrl_c_handler(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after in-flight requests");
            token.cancel();
        }
    });
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    // Log lines go through the indicatif writer so they never tear the progress bar.
    let indicatif_layer = IndicatifLayer::new();

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(indicatif_layer.get_stderr_writer())
                .with_target(false)
                .with_level(verbose),
        )
        .with(indicatif_layer)
        .init();
}
