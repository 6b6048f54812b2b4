//! lantern-agent entry point.
//!
//! Boots the proxy agent on a JSON-lines stdio transport.
//! Logging goes to stderr to avoid interfering with host commands on stdout.

use anyhow::{Context, Result};
use lantern_core::AppConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    tracing::info!(
        origin = %config.origin,
        version = %config.cache_version,
        db = %config.db_path.display(),
        "Starting lantern agent on stdio transport"
    );

    lantern_agent::stdio::run(config).await?;

    Ok(())
}
