//! Fleet group daemon
//!
//! Hosts the group controller with the built-in development plugins and
//! watches the groups listed in the configured groups file.

use std::sync::Arc;

use anyhow::Result;
use fleet_group::config::Config;
use fleet_group::GroupPlugin;
use fleet_spi::{MemoryInstancePlugin, StaticPlugins, VanillaFlavor};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str())),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        groups_file = ?config.groups_file,
        "Starting fleet group daemon"
    );

    let plugins = StaticPlugins::new()
        .with_instance("memory", Arc::new(MemoryInstancePlugin::new()))
        .with_flavor("vanilla", Arc::new(VanillaFlavor));

    let groups = GroupPlugin::new(Arc::new(plugins), config.poll_interval);

    for spec in config.load_groups()? {
        let id = spec.id.clone();
        match groups.watch_group(spec).await {
            Ok(()) => info!(group_id = %id, "Watching group from groups file"),
            Err(e) => error!(group_id = %id, error = %e, "Failed to watch group"),
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    groups.shutdown().await;

    info!("Group daemon shutdown complete");
    Ok(())
}
