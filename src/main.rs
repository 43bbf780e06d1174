use anyhow::Result;
use tracing_subscriber::{fmt, EnvFilter};

mod api;
mod auth;
mod config;
mod db;
mod error;
mod graph;
mod models;
mod orchestrator;
mod perms;
mod rooms;
mod store;
mod transport;

use crate::config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    match config.logging.format.as_str() {
        "json" => fmt().with_env_filter(filter).json().init(),
        _ => fmt().with_env_filter(filter).init(),
    }

    tracing::info!("starting jamhub v{}", env!("CARGO_PKG_VERSION"));

    orchestrator::run(config).await
}
