//! tallyd: build lifecycle tracking server.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tally_core::{ServiceConfig, StorageMode};
use tally_web::AppState;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "tallyd", version)]
#[command(about = "HTTP service tracking build start/finish times")]
struct Cli {
    /// Path to a TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind, overriding the config file.
    #[arg(short, long)]
    bind: Option<String>,

    /// Use namespace (single-document) storage instead of a database.
    #[arg(long)]
    lightweight: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ServiceConfig::load_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ServiceConfig::default(),
    };
    config.apply_env();
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }
    if cli.lightweight {
        config.storage.mode = StorageMode::Namespace;
    }

    let store = tally_store::open(&config.storage)
        .await
        .context("initializing storage backend")?;
    tracing::info!(mode = config.storage.mode.label(), "storage initialized");

    let state = AppState::new(store, config.storage.mode, VERSION);
    let app = tally_web::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    tracing::info!(version = VERSION, addr = %config.bind, "tallyd listening");

    axum::serve(listener, app).await.context("serving HTTP")?;
    Ok(())
}
