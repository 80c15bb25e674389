//! Wires the components together for the command line.
//!
//! The supervisor and the kill feed share nothing but configuration: the
//! supervisor owns the server process, the activation controller owns the
//! monitor loop's lifecycle.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::identity::{IdentityStore, IngestSummary, ingest_directory};
use crate::constants;
use crate::killfeed::{
    ActivationController, HttpOccupancy, MonitorLoop, MonitorSettings, NotificationDispatcher,
    WebhookNotifier,
};
use crate::mods;
use crate::process::{CommandLauncher, LauncherQuery, ProcessSupervisor, ReadinessCheck};

struct ActivationTask {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct ServerManager {
    config: Arc<Config>,
    client: reqwest::Client,
    supervisor: ProcessSupervisor,
    monitor: Arc<MonitorLoop>,
    activation: parking_lot::Mutex<Option<ActivationTask>>,
}

impl ServerManager {
    /// Build every component from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(constants::HTTP_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        let readiness = LauncherQuery::from_config(&config, client.clone())
            .map(|query| Arc::new(query) as Arc<dyn ReadinessCheck>);
        let supervisor = ProcessSupervisor::new(
            config.server.clone(),
            config.supervisor.clone(),
            Arc::new(CommandLauncher),
            readiness,
        );

        let notifier = WebhookNotifier::with_client(client.clone(), &config.killfeed.webhook_url);
        let monitor = Arc::new(MonitorLoop::new(
            MonitorSettings::from_config(&config.killfeed),
            NotificationDispatcher::new(Arc::new(notifier)),
        ));

        Ok(Self {
            config: Arc::new(config),
            client,
            supervisor,
            monitor,
            activation: parking_lot::Mutex::new(None),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    pub fn monitor(&self) -> &Arc<MonitorLoop> {
        &self.monitor
    }

    /// Regenerate the mod list from the mods directory.
    pub fn generate_mods(&self) -> Result<Vec<String>> {
        mods::generate_mod_list(&self.config.mods, &self.config.server.mods_file)
    }

    /// Learn identities from every existing log file. Run before the kill
    /// feed starts, since the monitor loads the store when it starts.
    pub async fn ingest_logs(&self) -> Result<IngestSummary> {
        let config = Arc::clone(&self.config);
        tokio::task::spawn_blocking(move || {
            let killfeed = &config.killfeed;
            let mut store = IdentityStore::open(&killfeed.identity_file)?;
            ingest_directory(&killfeed.log_dir, &killfeed.log_extension, &mut store)
        })
        .await
        .context("Identity ingestion panicked")?
    }

    /// Operator start: refresh the mod list if configured, then launch.
    pub async fn start_server(&self) -> Result<()> {
        if self.config.mods.generate_on_start {
            self.generate_mods()?;
        }
        self.supervisor.start().await
    }

    pub async fn stop_server(&self) -> Result<()> {
        self.supervisor.stop().await
    }

    pub async fn restart_server(&self) -> Result<()> {
        self.supervisor.restart().await
    }

    /// Start occupancy polling, which in turn runs the kill feed while
    /// players are online. Does nothing if polling is already running.
    pub fn start_monitoring(&self) {
        let mut activation = self.activation.lock();
        if activation.as_ref().is_some_and(|a| !a.task.is_finished()) {
            return;
        }

        let controller = ActivationController::new(
            Arc::new(HttpOccupancy::new(
                self.client.clone(),
                &self.config.killfeed.occupancy_url,
            )),
            self.monitor.clone(),
            self.config.killfeed.occupancy_interval(),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(controller.run(shutdown_rx));
        *activation = Some(ActivationTask { shutdown_tx, task });
        info!("Kill feed activation enabled");
    }

    /// Stop occupancy polling and the kill feed itself.
    pub async fn stop_monitoring(&self) {
        let activation = self.activation.lock().take();
        if let Some(activation) = activation {
            let _ = activation.shutdown_tx.send(true);
            if let Err(e) = activation.task.await {
                warn!(error = %e, "Activation task ended abnormally");
            }
        }
        self.monitor.stop().await;
    }

    /// Stop everything this manager started.
    pub async fn shutdown(&self) -> Result<()> {
        self.stop_monitoring().await;
        self.supervisor.stop().await
    }
}

impl std::fmt::Debug for ServerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerManager")
            .field("server", &self.config.server.name)
            .field("supervisor", &self.supervisor)
            .field("monitor", &self.monitor)
            .finish_non_exhaustive()
    }
}
