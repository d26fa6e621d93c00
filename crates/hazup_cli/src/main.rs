use std::{net::SocketAddr, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hazup_http::{build_router, cors_layer, AppState};
use hazup_store::{FileStore, StoreConfig, DEFAULT_LOG_FILE};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Parser)]
#[command(author, version, about = "Hazard dataset upload daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Serve {
        #[arg(long, default_value = "config/hazupd.toml")]
        config: PathBuf,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct RuntimeConfig {
    http: HttpSection,
    storage: StorageSection,
}

#[derive(Debug, Clone, Deserialize)]
struct HttpSection {
    bind: String,
    cors_origin: String,
}

#[derive(Debug, Clone, Deserialize)]
struct StorageSection {
    root: PathBuf,
    #[serde(default = "default_log_file")]
    log_file: PathBuf,
}

fn default_log_file() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_FILE)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { config } => serve(config).await,
    }
}

async fn serve(config_path: PathBuf) -> Result<()> {
    let config_source = std::fs::read_to_string(&config_path)
        .with_context(|| format!("failed to read config file {}", config_path.display()))?;
    let config: RuntimeConfig = toml::from_str(&config_source)
        .with_context(|| format!("invalid config TOML at {}", config_path.display()))?;

    let store = FileStore::open(&StoreConfig {
        root: config.storage.root.clone(),
        log_file: config.storage.log_file.clone(),
    })
    .await
    .context("failed to open upload store")?;

    let cors = cors_layer(&config.http.cors_origin)
        .with_context(|| format!("invalid cors origin {}", config.http.cors_origin))?;

    let state = AppState { store };
    let app = build_router(state).layer(cors);

    let socket: SocketAddr = config
        .http
        .bind
        .parse()
        .with_context(|| format!("invalid socket address {}", config.http.bind))?;

    let listener = tokio::net::TcpListener::bind(socket)
        .await
        .with_context(|| format!("failed to bind {}", config.http.bind))?;

    info!(bind = %config.http.bind, "hazupd upload service listening");
    axum::serve(listener, app).await.context("axum server failed")
}
