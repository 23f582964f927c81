// Colonnade storage node entry point.
//
// Loads configuration, brings up the health endpoint, and initializes
// structured logging. Tablet registration, push, and compaction are
// driven by whatever RPC/transport layer embeds this crate; that
// surface is out of scope here.

use colonnade::health::HealthState;
use colonnade::{EngineConfig, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).with_thread_ids(true).with_level(true).init();

    let install_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let config_path = install_dir.join("colonnade.toml");
    let config = EngineConfig::load_or_default(&config_path)?;

    std::fs::create_dir_all(&config.data_dir)?;

    info!(version = colonnade::VERSION, data_dir = %config.data_dir.display(), "starting colonnade node");

    let health_state = Arc::new(HealthState::new(config.unhealthy_disk_threshold));
    health_state.mark_startup_succeeded();

    let app = colonnade::health::router(health_state);
    let listener = tokio::net::TcpListener::bind(&config.health_bind_address).await?;
    info!(address = %config.health_bind_address, "health endpoint listening");

    axum::serve(listener, app).await?;
    Ok(())
}
