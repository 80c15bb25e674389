//! Keeps the server process running.
//!
//! ```text
//! Stopped --start--> Starting --launched--> Running
//!    ^                   ^                     |
//!    |                   +------crashed--------+
//!    +-----------------stop--------------------+
//! ```
//!
//! A liveness task polls the process at a fixed interval. An exit that the
//! operator did not ask for is a crash: the handle is reaped, and after a
//! short delay the server is launched again, with no retry ceiling. Every
//! launch schedules a readiness confirmation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::launch::{LaunchSpec, Liveness, ServerLauncher, ServerProcess};
use super::readiness::{ReadinessCheck, confirm_and_report};
use crate::config::{ServerConfig, SupervisorConfig};
use crate::mods;
use crate::utils::format_duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Stopped,
    Starting,
    Running,
}

/// The live process plus when it was launched.
struct ServerProcessHandle {
    process: Box<dyn ServerProcess>,
    started_at: DateTime<Utc>,
}

impl ServerProcessHandle {
    fn uptime(&self) -> String {
        format_duration(Utc::now() - self.started_at)
    }
}

#[derive(Default)]
struct Slot {
    handle: Option<ServerProcessHandle>,
    /// Set by `start`, cleared by `stop`. The liveness task only relaunches
    /// while this is set.
    wanted: bool,
    readiness: Option<JoinHandle<()>>,
}

struct LivenessTask {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

struct Inner {
    server: ServerConfig,
    timing: SupervisorConfig,
    launcher: Arc<dyn ServerLauncher>,
    readiness: Option<Arc<dyn ReadinessCheck>>,
    slot: Mutex<Slot>,
    liveness: parking_lot::Mutex<Option<LivenessTask>>,
    state_tx: watch::Sender<SupervisorState>,
    launches: AtomicU64,
}

/// Cheap to clone; all clones drive the same process.
#[derive(Clone)]
pub struct ProcessSupervisor {
    inner: Arc<Inner>,
}

impl ProcessSupervisor {
    pub fn new(
        server: ServerConfig,
        timing: SupervisorConfig,
        launcher: Arc<dyn ServerLauncher>,
        readiness: Option<Arc<dyn ReadinessCheck>>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SupervisorState::Stopped);
        Self {
            inner: Arc::new(Inner {
                server,
                timing,
                launcher,
                readiness,
                slot: Mutex::new(Slot::default()),
                liveness: parking_lot::Mutex::new(None),
                state_tx,
                launches: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> SupervisorState {
        *self.inner.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.inner.state_tx.subscribe()
    }

    /// Number of launches so far, including crash restarts.
    pub fn launches(&self) -> u64 {
        self.inner.launches.load(Ordering::Relaxed)
    }

    /// OS process ID of the running server.
    pub async fn pid(&self) -> Option<u32> {
        let slot = self.inner.slot.lock().await;
        slot.handle.as_ref().and_then(|h| h.process.id())
    }

    /// Launch the server and begin liveness polling.
    ///
    /// Starting a running server does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the mod list cannot be read or the process
    /// cannot be spawned. The supervisor is left Stopped.
    pub async fn start(&self) -> Result<()> {
        {
            let mut slot = self.inner.slot.lock().await;
            if slot.handle.is_some() {
                info!(server = %self.inner.server.name, "Server already running");
                return Ok(());
            }
            if let Err(e) = self.inner.launch(&mut slot) {
                self.inner.state_tx.send_replace(SupervisorState::Stopped);
                return Err(e);
            }
            slot.wanted = true;
        }
        self.ensure_liveness();
        Ok(())
    }

    /// Stop liveness polling, then terminate the server and wait for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the process could neither be stopped nor killed.
    pub async fn stop(&self) -> Result<()> {
        let liveness = self.inner.liveness.lock().take();
        if let Some(liveness) = liveness {
            let _ = liveness.stop_tx.send(true);
            if let Err(e) = liveness.task.await {
                warn!(error = %e, "Liveness task ended abnormally");
            }
        }

        let mut slot = self.inner.slot.lock().await;
        slot.wanted = false;
        if let Some(task) = slot.readiness.take() {
            task.abort();
        }
        let result = match slot.handle.take() {
            Some(mut handle) => {
                info!(server = %self.inner.server.name, "Stopping server");
                let result = handle
                    .process
                    .terminate(self.inner.timing.stop_grace())
                    .await
                    .context("Failed to stop server process");
                if result.is_ok() {
                    info!(uptime = %handle.uptime(), "Server stopped");
                }
                result
            },
            None => Ok(()),
        };
        self.inner.state_tx.send_replace(SupervisorState::Stopped);
        result
    }

    /// Operator restart: stop, pause, start.
    pub async fn restart(&self) -> Result<()> {
        self.stop().await?;
        tokio::time::sleep(self.inner.timing.operator_restart_delay()).await;
        self.start().await
    }

    fn ensure_liveness(&self) {
        let mut liveness = self.inner.liveness.lock();
        if liveness.as_ref().is_some_and(|l| !l.task.is_finished()) {
            return;
        }
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(Arc::clone(&self.inner).watch_liveness(stop_rx));
        *liveness = Some(LivenessTask { stop_tx, task });
    }
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("state", &self.state())
            .field("launches", &self.launches())
            .finish_non_exhaustive()
    }
}

impl Inner {
    /// Spawn a new process into an empty slot. The caller holds the lock.
    fn launch(&self, slot: &mut Slot) -> Result<()> {
        self.state_tx.send_replace(SupervisorState::Starting);

        let mod_list = mods::read_mod_list(&self.server.mods_file)?;
        let spec = LaunchSpec::from_config(&self.server, &mod_list);
        let process = self.launcher.launch(&spec)?;
        info!(
            server = %self.server.name,
            pid = ?process.id(),
            mods = mod_list.len(),
            "Server started"
        );

        slot.handle = Some(ServerProcessHandle {
            process,
            started_at: Utc::now(),
        });
        self.launches.fetch_add(1, Ordering::Relaxed);

        if let Some(previous) = slot.readiness.take() {
            previous.abort();
        }
        slot.readiness = self
            .readiness
            .clone()
            .map(|check| tokio::spawn(confirm_and_report(check)));

        self.state_tx.send_replace(SupervisorState::Running);
        Ok(())
    }

    async fn watch_liveness(self: Arc<Self>, mut stop_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.timing.liveness_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        debug!(interval_secs = self.timing.liveness_interval_secs, "Liveness polling started");

        loop {
            tokio::select! {
                biased;
                _ = stop_rx.changed() => break,
                _ = ticker.tick() => {},
            }

            let mut slot = self.slot.lock().await;
            if !slot.wanted {
                continue;
            }

            if let Some(handle) = slot.handle.as_mut() {
                match handle.process.liveness() {
                    Ok(Liveness::Alive) => continue,
                    Ok(Liveness::Exited { code }) => {
                        error!(
                            server = %self.server.name,
                            exit_code = ?code,
                            uptime = %handle.uptime(),
                            "Server process terminated, restarting"
                        );
                    },
                    Err(e) => {
                        warn!(error = %format!("{e:#}"), "Liveness check failed");
                        continue;
                    },
                }

                if let Some(mut crashed) = slot.handle.take()
                    && let Err(e) = crashed.process.terminate(self.timing.stop_grace()).await
                {
                    warn!(error = %format!("{e:#}"), "Failed to reap crashed server process");
                }
                self.state_tx.send_replace(SupervisorState::Starting);
                drop(slot);

                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    () = tokio::time::sleep(self.timing.restart_delay()) => {},
                }
                slot = self.slot.lock().await;
            }

            // Either just crashed, or a previous relaunch failed.
            if slot.wanted
                && slot.handle.is_none()
                && let Err(e) = self.launch(&mut slot)
            {
                error!(
                    error = %format!("{e:#}"),
                    "Server restart failed, retrying on the next liveness poll"
                );
            }
        }
        debug!("Liveness polling stopped");
    }
}

#[cfg(test)]
mod tests;
