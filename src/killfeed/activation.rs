//! Runs the kill feed only while someone is playing.
//!
//! The controller polls the occupancy endpoint and starts the monitor loop
//! on the transition from zero to any players, and stops it on the
//! transition back to zero. A failed poll changes nothing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::monitor::MonitorControl;

#[derive(Debug, Error)]
pub enum OccupancyError {
    #[error("occupancy request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("occupancy endpoint returned status {0}")]
    Status(u16),

    #[error("malformed occupancy response: {0}")]
    Malformed(String),
}

/// Source of the current player count.
#[async_trait]
pub trait OccupancySource: Send + Sync {
    async fn player_count(&self) -> Result<u32, OccupancyError>;
}

#[derive(Deserialize)]
struct OccupancyResponse {
    result: OccupancyResult,
}

#[derive(Deserialize)]
struct OccupancyResult {
    players: u32,
}

/// Extract `result.players` from an occupancy response body.
pub fn parse_player_count(body: &str) -> Result<u32, OccupancyError> {
    serde_json::from_str::<OccupancyResponse>(body)
        .map(|r| r.result.players)
        .map_err(|e| OccupancyError::Malformed(e.to_string()))
}

/// Polls a JSON endpoint shaped like `{"result": {"players": N}}`.
#[derive(Debug, Clone)]
pub struct HttpOccupancy {
    client: reqwest::Client,
    url: String,
}

impl HttpOccupancy {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl OccupancySource for HttpOccupancy {
    async fn player_count(&self) -> Result<u32, OccupancyError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OccupancyError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        parse_player_count(&body)
    }
}

/// What a single poll did to the monitor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Started,
    Stopped,
    Unchanged,
}

pub struct ActivationController {
    source: Arc<dyn OccupancySource>,
    monitor: Arc<dyn MonitorControl>,
    interval: Duration,
    /// Last successfully observed count. The loop is idle at start-up, so
    /// no observation behaves like zero.
    last_count: u32,
}

impl ActivationController {
    pub fn new(
        source: Arc<dyn OccupancySource>,
        monitor: Arc<dyn MonitorControl>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            monitor,
            interval,
            last_count: 0,
        }
    }

    pub fn last_count(&self) -> u32 {
        self.last_count
    }

    /// Poll once and apply the resulting transition.
    pub async fn poll_once(&mut self) -> Transition {
        let count = match self.source.player_count().await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Occupancy poll failed, keeping current state");
                return Transition::Unchanged;
            },
        };
        debug!(players = count, previous = self.last_count, "Occupancy polled");

        match (self.last_count, count) {
            (0, n) if n > 0 => match self.monitor.start().await {
                Ok(_) => {
                    info!(players = n, "Players online, kill feed activated");
                    self.last_count = n;
                    Transition::Started
                },
                Err(e) => {
                    // Leave the count at zero so the next poll retries.
                    error!(error = %format!("{e:#}"), "Failed to start kill feed");
                    Transition::Unchanged
                },
            },
            (prev, 0) if prev > 0 => {
                self.monitor.stop().await;
                info!("Server empty, kill feed deactivated");
                self.last_count = 0;
                Transition::Stopped
            },
            (_, n) => {
                self.last_count = n;
                Transition::Unchanged
            },
        }
    }

    /// Poll until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.interval.as_secs(), "Occupancy polling started");

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                },
                _ = ticker.tick() => {
                    self.poll_once().await;
                },
            }
        }
        debug!("Occupancy polling stopped");
    }
}

impl std::fmt::Debug for ActivationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationController")
            .field("interval", &self.interval)
            .field("last_count", &self.last_count)
            .finish_non_exhaustive()
    }
}
