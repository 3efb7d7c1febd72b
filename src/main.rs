use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use eyre::{Result, WrapErr};
use log::{LevelFilter, info, warn};
use tokio::net::TcpListener;

use yt_transcript_api::config::{self, Config};
use yt_transcript_api::server::{self, AppState, DEFAULT_LANG, TRANSCRIPT_PATH};
use yt_transcript_api::youtube::YouTubeCaptions;

mod cli;

use cli::Cli;

const DEFAULT_BIND: &str = "127.0.0.1:3000";

fn setup_logging(log_file: Option<&Path>, verbose: bool) -> Result<()> {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(if verbose { LevelFilter::Debug } else { LevelFilter::Info })
        .parse_default_env();

    if let Some(log_file) = log_file {
        if let Some(dir) = log_file.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let target = Box::new(std::fs::OpenOptions::new().create(true).append(true).open(log_file)?);
        builder.target(env_logger::Target::Pipe(target));
    }

    builder.init();

    if let Some(log_file) = log_file {
        info!("Logging initialized: {}", log_file.display());
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config file (non-fatal if missing/invalid)
    let config_path = cli.config.clone().unwrap_or_else(config::config_path);
    let loaded = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };

    // CLI flags take priority over the config file
    let log_file = cli
        .log_file
        .clone()
        .or_else(|| loaded.as_ref().ok().and_then(|c| c.log_file.clone()));
    setup_logging(log_file.as_deref(), cli.verbose)?;

    if let Err(e) = &loaded {
        warn!("Ignoring config {}: {e:#}", config_path.display());
    }
    let config = loaded.unwrap_or_default();

    let bind = cli.bind.or(config.bind).unwrap_or_else(|| DEFAULT_BIND.to_string());
    let default_lang = cli.lang.or(config.default_lang).unwrap_or_else(|| DEFAULT_LANG.to_string());

    let mut provider = YouTubeCaptions::new(reqwest::Client::new());
    if let Some(base_url) = config.youtube_base_url {
        provider = provider.with_base_url(base_url);
    }
    if let Some(user_agent) = config.user_agent {
        provider = provider.with_user_agent(user_agent);
    }

    let state = AppState::new(Arc::new(provider), default_lang.clone());
    let listener = TcpListener::bind(&bind)
        .await
        .wrap_err_with(|| format!("failed to bind {bind}"))?;

    info!(
        "Listening on http://{}{TRANSCRIPT_PATH} (default language: {default_lang})",
        listener.local_addr()?
    );

    server::serve(listener, state, shutdown_signal()).await?;
    Ok(())
}
