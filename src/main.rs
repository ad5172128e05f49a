//! CLI entry point for the uploader tool.

use std::io::{self, IsTerminal};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uploader_core::transfer::{
    ProgressReporter, ReqwestTransport, TerminalSink, ThrottlingTransport, WriterSink,
    kbps_to_bytes_per_sec,
};
use uploader_core::upload::{
    MetaFile, UploadClient, UploadConfig, UploadSource, UploadedVideo, build_metadata,
};

mod app_config;
mod cli;
mod config_runtime;
mod terminal;

use cli::Args;
use config_runtime::{RuntimeSettings, resolve_settings};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    match run(args).await {
        Ok(video) => {
            println!("Upload successful! Video ID: {}", video.id);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<UploadedVideo> {
    let loaded = app_config::load_default_file_config()?;
    let settings = resolve_settings(args, loaded.config.as_ref())?;

    terminal::init_tracing(settings.log_level, terminal::no_color_env_requested());
    if let Some(path) = loaded.path.as_deref().filter(|_| loaded.config.is_some()) {
        debug!(path = %path.display(), "loaded config file");
    }
    debug!(?settings, "runtime settings resolved");
    info!("Uploader starting");

    let source_client = reqwest::Client::builder()
        .connect_timeout(settings.connect_timeout)
        .read_timeout(settings.read_timeout)
        .no_gzip()
        .build()
        .context("Failed to build HTTP client for the source")?;
    let source = UploadSource::open(&settings.filename, &source_client)
        .await
        .with_context(|| format!("Cannot open upload source '{}'", settings.filename))?;
    info!(source = source.name(), bytes = source.total_bytes(), "source opened");

    let metadata = build_metadata(load_meta_file(&settings).as_ref(), &settings.metadata);
    debug!(?metadata, "upload metadata");

    let network = ReqwestTransport::with_timeouts(settings.connect_timeout, settings.read_timeout)
        .context("Failed to build HTTP client for the upload")?;
    let transport = ThrottlingTransport::new(
        network,
        kbps_to_bytes_per_sec(settings.ratelimit_kbps),
        source.total_bytes(),
    );

    let shutdown = CancellationToken::new();
    let mut reporter = (!settings.quiet).then(|| {
        let use_bar =
            terminal::should_use_bar(io::stdout().is_terminal(), terminal::is_dumb_terminal());
        let reporter = if use_bar {
            ProgressReporter::new(transport.monitor_handle(), TerminalSink::new())
        } else {
            ProgressReporter::new(transport.monitor_handle(), WriterSink::new(io::stdout()))
        };
        reporter.with_shutdown(&shutdown)
    });
    if let Some(reporter) = reporter.as_mut() {
        reporter.start();
    }

    let client = UploadClient::new(
        transport,
        UploadConfig {
            endpoint: settings.endpoint.clone(),
            access_token: settings.access_token.clone(),
            chunk_size: settings.chunk_size,
            ..UploadConfig::default()
        },
    );

    let outcome = tokio::select! {
        result = client.upload(&metadata, source) => result.context("Upload failed"),
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupt received, abandoning upload");
            Err(anyhow::anyhow!("Upload interrupted"))
        }
    };

    shutdown.cancel();
    if let Some(reporter) = reporter {
        reporter.finish().await;
    }
    outcome
}

/// Loads `--meta-json`, falling back to flags when it is unreadable.
fn load_meta_file(settings: &RuntimeSettings) -> Option<MetaFile> {
    let path = settings.meta_json.as_deref()?;
    match MetaFile::load(path) {
        Ok(meta) => Some(meta),
        Err(err) => {
            warn!(error = %err, "ignoring metadata file, using command line values");
            None
        }
    }
}
