//! Long-running modes.
//!
//! - `dzkeeper run` - kill feed, plus the server when `server.auto_start`
//!   is set or `--start-server` is passed
//! - `dzkeeper server` - supervised server only
//! - `dzkeeper killfeed` - kill feed only
//!
//! All modes run until Ctrl+C (or SIGTERM on Unix), then stop what they
//! started.

use anyhow::Result;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::manager::ServerManager;

/// Which components a run drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunMode {
    pub server: bool,
    pub killfeed: bool,
}

impl RunMode {
    pub fn all(config: &Config, start_server: bool) -> Self {
        Self {
            server: start_server || config.server.auto_start,
            killfeed: true,
        }
    }

    pub const SERVER_ONLY: Self = Self {
        server: true,
        killfeed: false,
    };

    pub const KILLFEED_ONLY: Self = Self {
        server: false,
        killfeed: true,
    };
}

pub async fn execute(config: Config, mode: RunMode) -> Result<()> {
    let manager = ServerManager::new(config)?;
    info!(
        server = %manager.config().server.name,
        supervise = mode.server,
        killfeed = mode.killfeed,
        "dzkeeper v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    if mode.server {
        manager.start_server().await?;
    }
    if mode.killfeed {
        // Players who connected before this run resolve from the first kill.
        if let Err(e) = manager.ingest_logs().await {
            warn!(error = %format!("{e:#}"), "Startup identity ingestion failed");
        }
        manager.start_monitoring();
    }

    shutdown_signal().await?;
    info!("Shutdown requested");

    if let Err(e) = manager.shutdown().await {
        error!(error = %format!("{e:#}"), "Shutdown did not complete cleanly");
        return Err(e);
    }
    info!("Shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
