//! Display-name to stable-identity resolution.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::store::{IdentityStore, SightingOutcome};
use crate::constants;

/// Recognises AI characters by name.
#[derive(Debug, Clone, Default)]
pub struct BotFilter {
    needles: Vec<String>,
}

impl BotFilter {
    /// Build a filter from case-insensitive name fragments.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let needles = names
            .into_iter()
            .map(|n| n.as_ref().trim().to_lowercase())
            .filter(|n| !n.is_empty())
            .collect();
        Self { needles }
    }

    pub fn is_bot(&self, name: &str) -> bool {
        if name == constants::AI_FACTION_NAME {
            return true;
        }
        let lowered = name.to_lowercase();
        self.needles.iter().any(|needle| lowered.contains(needle))
    }
}

/// Outcome of resolving an event subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// AI character; never looked up.
    Bot,
    Known(String),
    Unresolved,
}

/// Resolves display names against the identity store.
///
/// Owned by a single monitor task, so the store needs no locking.
#[derive(Debug)]
pub struct IdentityResolver {
    store: IdentityStore,
    bots: BotFilter,
    unresolved_log: PathBuf,
    /// Unresolved-name appends still being written.
    pending_appends: JoinSet<()>,
}

impl IdentityResolver {
    pub fn new(store: IdentityStore, bots: BotFilter, unresolved_log: impl Into<PathBuf>) -> Self {
        Self {
            store,
            bots,
            unresolved_log: unresolved_log.into(),
            pending_appends: JoinSet::new(),
        }
    }

    pub fn store(&self) -> &IdentityStore {
        &self.store
    }

    pub fn is_bot(&self, name: &str) -> bool {
        self.bots.is_bot(name)
    }

    /// Stable identity for `name`, or `None` for bots and unknown names.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        if self.bots.is_bot(name) {
            return None;
        }
        self.store.lookup(name).map(|record| record.id.as_str())
    }

    /// Resolve an event subject, recording it for manual reconciliation
    /// when it is neither a bot nor a known player.
    ///
    /// The append runs in the background; failures are logged and
    /// otherwise ignored. Call [`flush`](Self::flush) to wait for it.
    pub fn resolve_subject(&mut self, name: &str) -> Resolution {
        if self.bots.is_bot(name) {
            return Resolution::Bot;
        }

        match self.store.lookup(name) {
            Some(record) => Resolution::Known(record.id.clone()),
            None => {
                while self.pending_appends.try_join_next().is_some() {}
                let path = self.unresolved_log.clone();
                let name = name.to_string();
                self.pending_appends.spawn(async move {
                    match append_unresolved(&path, &name).await {
                        Ok(()) => info!(player = %name, "Logged unreported player"),
                        Err(e) => warn!(
                            player = %name,
                            path = %path.display(),
                            error = %format!("{e:#}"),
                            "Failed to record unresolved player"
                        ),
                    }
                });
                Resolution::Unresolved
            },
        }
    }

    /// Wait for unresolved-name appends still in flight.
    pub async fn flush(&mut self) {
        while self.pending_appends.join_next().await.is_some() {}
    }

    /// Record a name/identity pairing and persist the whole store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written. The in-memory map
    /// keeps the update either way.
    pub async fn observe(&mut self, name: &str, id: &str) -> Result<SightingOutcome> {
        let outcome = self.store.record_sighting(name, id);
        match &outcome {
            SightingOutcome::Unchanged => {
                debug!(player = %name, steam_id = %id, "Identity already up to date");
                return Ok(outcome);
            },
            SightingOutcome::New => {
                info!(player = %name, steam_id = %id, "New identity");
            },
            SightingOutcome::Renamed { previous } => {
                info!(
                    player = %name,
                    previous = %previous,
                    steam_id = %id,
                    "Identity seen under a new name"
                );
            },
        }

        self.store.persist_async().await?;
        Ok(outcome)
    }
}

async fn append_unresolved(path: &Path, name: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    file.write_all(format!("{name}\n").as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn resolver(dir: &TempDir) -> IdentityResolver {
        IdentityResolver::new(
            IdentityStore::new(dir.path().join("steam_ids.json")),
            BotFilter::new(["_AI", "Zombie"]),
            dir.path().join("unresolved.txt"),
        )
    }

    #[test]
    fn test_bot_filter() {
        let bots = BotFilter::new(["_ai", " ", "Raider"]);
        assert!(bots.is_bot("Wolf_AI"));
        assert!(bots.is_bot("raider_07"));
        assert!(bots.is_bot(constants::AI_FACTION_NAME));
        assert!(!bots.is_bot("Bob"));
        // The empty fragment is dropped instead of matching everything.
        assert!(!BotFilter::new([""]).is_bot("Bob"));
    }

    #[tokio::test]
    async fn test_observe_then_resolve() -> Result<()> {
        let dir = TempDir::new()?;
        let mut resolver = resolver(&dir);

        resolver.observe("Bob", "42").await?;
        resolver.observe("Bob(2)", "42").await?;

        assert_eq!(resolver.resolve("Bob"), Some("42"));
        assert_eq!(resolver.resolve("Bob(2)"), Some("42"));

        let reloaded = IdentityStore::open(dir.path().join("steam_ids.json"))?;
        assert_eq!(reloaded.get("42").unwrap().display_name, "Bob(2)");
        Ok(())
    }

    #[tokio::test]
    async fn test_unchanged_observe_does_not_write() -> Result<()> {
        let dir = TempDir::new()?;
        let mut resolver = resolver(&dir);
        resolver.observe("Bob", "42").await?;
        std::fs::remove_file(dir.path().join("steam_ids.json"))?;

        let outcome = resolver.observe("Bob", "42").await?;
        assert_eq!(outcome, SightingOutcome::Unchanged);
        assert!(!dir.path().join("steam_ids.json").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_subject_logs_unresolved() -> Result<()> {
        let dir = TempDir::new()?;
        let mut resolver = resolver(&dir);

        assert_eq!(resolver.resolve_subject("Bob"), Resolution::Unresolved);
        assert_eq!(resolver.resolve_subject("Bob"), Resolution::Unresolved);
        resolver.flush().await;

        let log = std::fs::read_to_string(dir.path().join("unresolved.txt"))?;
        assert_eq!(log, "Bob\nBob\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_unresolved_append_failure_does_not_block() -> Result<()> {
        let dir = TempDir::new()?;
        // A directory where the log file should be makes the append fail.
        std::fs::create_dir(dir.path().join("unresolved.txt"))?;
        let mut resolver = resolver(&dir);

        assert_eq!(resolver.resolve_subject("Bob"), Resolution::Unresolved);
        resolver.flush().await;
        assert!(dir.path().join("unresolved.txt").is_dir());
        Ok(())
    }

    #[tokio::test]
    async fn test_bots_are_never_looked_up_or_logged() -> Result<()> {
        let dir = TempDir::new()?;
        let mut resolver = resolver(&dir);
        // Even a recorded pairing does not resolve for a bot name.
        resolver.observe("Wolf_AI", "7").await?;

        assert_eq!(resolver.resolve("Wolf_AI"), None);
        assert_eq!(resolver.resolve_subject("Wolf_AI"), Resolution::Bot);
        resolver.flush().await;
        assert!(!dir.path().join("unresolved.txt").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_known_subject() -> Result<()> {
        let dir = TempDir::new()?;
        let mut resolver = resolver(&dir);
        resolver.observe("Eve", "9").await?;

        assert_eq!(
            resolver.resolve_subject("Eve"),
            Resolution::Known("9".to_string())
        );
        Ok(())
    }
}
