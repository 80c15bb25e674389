//! The kill feed pipeline and its start/stop lifecycle.
//!
//! One pipeline task owns the tailer and the identity resolver. Each line
//! is either a sighting (recorded in the identity store) or a candidate
//! kill feed event (classified, resolved and dispatched). Lines are
//! processed strictly in order.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::classifier::EventClassifier;
use super::dispatch::NotificationDispatcher;
use super::tailer::{LogCursor, LogTailer, TailerConfig};
use crate::config::KillfeedConfig;
use crate::identity::{
    BotFilter, IdentityResolver, IdentityStore, Resolution, observe_log_prefix, parse_sighting,
};
use crate::logs;

/// Lifecycle of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Running,
    Stopping,
}

/// Everything the pipeline needs besides the classifier and dispatcher.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub tailer: TailerConfig,
    pub identity_file: PathBuf,
    pub unresolved_log: PathBuf,
    pub bot_names: Vec<String>,
    pub send_bot_events: bool,
}

impl MonitorSettings {
    pub fn from_config(config: &KillfeedConfig) -> Self {
        Self {
            tailer: TailerConfig {
                dir: config.log_dir.clone(),
                extension: config.log_extension.clone(),
                poll_interval: config.tail_poll_interval(),
                no_file_backoff: config.no_log_backoff(),
            },
            identity_file: config.identity_file.clone(),
            unresolved_log: config.unresolved_log.clone(),
            bot_names: config.bot_names.clone(),
            send_bot_events: config.send_bot_events,
        }
    }
}

/// Start/stop surface used by the activation controller.
#[async_trait]
pub trait MonitorControl: Send + Sync {
    /// Returns `Ok(false)` if the pipeline was already running.
    async fn start(&self) -> Result<bool>;
    /// Returns `false` if the pipeline was not running.
    async fn stop(&self) -> bool;
}

struct RunningPipeline {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owns at most one running pipeline.
pub struct MonitorLoop {
    settings: MonitorSettings,
    classifier: Arc<EventClassifier>,
    dispatcher: NotificationDispatcher,
    slot: Mutex<Option<RunningPipeline>>,
    state_tx: watch::Sender<MonitorState>,
}

impl MonitorLoop {
    pub fn new(settings: MonitorSettings, dispatcher: NotificationDispatcher) -> Self {
        let (state_tx, _) = watch::channel(MonitorState::Idle);
        Self {
            settings,
            classifier: Arc::new(EventClassifier::new()),
            dispatcher,
            slot: Mutex::new(None),
            state_tx,
        }
    }

    pub fn state(&self) -> MonitorState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.state_tx.subscribe()
    }

    /// Start the pipeline, loading the identity store first.
    ///
    /// Sightings already written to the current log are recorded before
    /// tailing begins, so the players whose arrival triggered the start
    /// resolve. Kill feed lines written before the start are not reported.
    ///
    /// Idempotent: a running pipeline is left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity store exists but cannot be read.
    pub async fn start(&self) -> Result<bool> {
        let mut slot = self.slot.lock().await;
        if let Some(running) = slot.as_ref() {
            if !running.task.is_finished() {
                debug!("Kill feed already running");
                return Ok(false);
            }
            warn!("Kill feed pipeline had exited, restarting it");
            *slot = None;
        }

        let settings = self.settings.clone();
        let (store, tailer) = tokio::task::spawn_blocking(move || -> Result<_> {
            let mut store = IdentityStore::open(&settings.identity_file)?;
            let tailer = catch_up(&settings.tailer, &mut store);
            Ok((store, tailer))
        })
        .await
        .context("Identity store loader panicked")??;
        info!(
            identities = store.len(),
            path = %self.settings.identity_file.display(),
            "Loaded identity store"
        );

        let pipeline = Pipeline {
            tailer,
            resolver: IdentityResolver::new(
                store,
                BotFilter::new(&self.settings.bot_names),
                self.settings.unresolved_log.clone(),
            ),
            classifier: Arc::clone(&self.classifier),
            dispatcher: self.dispatcher.clone(),
            send_bot_events: self.settings.send_bot_events,
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(pipeline.run(stop_rx));
        *slot = Some(RunningPipeline { stop_tx, task });
        self.state_tx.send_replace(MonitorState::Running);
        info!(dir = %self.settings.tailer.dir.display(), "Kill feed started");
        Ok(true)
    }

    /// Stop the pipeline and wait for it to finish the line in progress.
    ///
    /// Idempotent: stopping an idle loop does nothing.
    pub async fn stop(&self) -> bool {
        let mut slot = self.slot.lock().await;
        let Some(running) = slot.take() else {
            return false;
        };

        self.state_tx.send_replace(MonitorState::Stopping);
        let _ = running.stop_tx.send(true);
        if let Err(e) = running.task.await {
            warn!(error = %e, "Kill feed pipeline ended abnormally");
        }
        self.state_tx.send_replace(MonitorState::Idle);
        info!("Kill feed stopped");
        true
    }
}

#[async_trait]
impl MonitorControl for MonitorLoop {
    async fn start(&self) -> Result<bool> {
        MonitorLoop::start(self).await
    }

    async fn stop(&self) -> bool {
        MonitorLoop::stop(self).await
    }
}

impl std::fmt::Debug for MonitorLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorLoop")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Record the sightings in the complete lines of the newest log, then
/// build a tailer that continues right after them.
fn catch_up(config: &TailerConfig, store: &mut IdentityStore) -> LogTailer {
    let path = match logs::newest_log_file(&config.dir, &config.extension) {
        Ok(Some(path)) => path,
        // Whatever file appears next is written after the start.
        Ok(None) => return LogTailer::from_start(config.clone()),
        Err(e) => {
            warn!(error = %format!("{e:#}"), "Failed to list logs, skipping sighting catch-up");
            return LogTailer::new(config.clone());
        },
    };

    let scan = match observe_log_prefix(&path, store) {
        Ok(scan) => scan,
        Err(e) => {
            warn!(error = %format!("{e:#}"), "Sighting catch-up failed");
            return LogTailer::new(config.clone());
        },
    };
    if scan.changes > 0
        && let Err(e) = store.persist()
    {
        warn!(error = %format!("{e:#}"), "Failed to persist identities from catch-up");
    }
    debug!(
        path = %path.display(),
        sightings = scan.sightings,
        changes = scan.changes,
        "Caught up on current log"
    );
    LogTailer::resume(
        config.clone(),
        LogCursor {
            path,
            offset: scan.consumed,
        },
    )
}

struct Pipeline {
    tailer: LogTailer,
    resolver: IdentityResolver,
    classifier: Arc<EventClassifier>,
    dispatcher: NotificationDispatcher,
    send_bot_events: bool,
}

impl Pipeline {
    async fn run(mut self, mut stop_rx: watch::Receiver<bool>) {
        loop {
            // Only the wait for input is cancellable; a line that has been
            // read is always processed to completion.
            let next = tokio::select! {
                biased;
                _ = stop_rx.changed() => break,
                next = self.tailer.next_line() => next,
            };

            match next {
                Ok(line) => self.process_line(&line).await,
                Err(e) => {
                    warn!(error = %e, "Log read failed, reopening at the last position");
                    self.tailer.recover();
                    tokio::select! {
                        biased;
                        _ = stop_rx.changed() => break,
                        () = tokio::time::sleep(std::time::Duration::from_secs(1)) => {},
                    }
                },
            }
        }
        self.resolver.flush().await;
        debug!("Kill feed pipeline exiting");
    }

    async fn process_line(&mut self, line: &str) {
        if let Some(sighting) = parse_sighting(line) {
            if let Err(e) = self.resolver.observe(&sighting.name, &sighting.id).await {
                warn!(player = %sighting.name, error = %format!("{e:#}"), "Failed to persist identity");
            }
            return;
        }

        let Some(event) = self.classifier.classify(line) else {
            return;
        };

        let subject = self.resolver.resolve_subject(event.subject());
        let actor_id = event.actor().and_then(|actor| self.resolver.resolve(actor));
        debug!(
            kind = %event.kind(),
            subject = %event.subject(),
            subject_id = ?subject,
            actor = ?event.actor(),
            actor_id = ?actor_id,
            "Classified kill feed event"
        );

        if subject == Resolution::Bot && !self.send_bot_events {
            debug!(subject = %event.subject(), "Skipping bot death");
            return;
        }

        // Failures are logged by the dispatcher and not retried.
        let _ = self.dispatcher.dispatch(&event).await;
    }
}
