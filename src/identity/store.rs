//! Durable identity map.
//!
//! Maps stable identities (Steam IDs) to their current display name and the
//! names they were previously seen under. The whole map is rewritten on
//! every mutation; event rates are low enough that incremental persistence
//! is not worth its complexity.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::constants;

/// Duplicate-name suffix the game appends when a name is already taken.
static SUFFIX_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\d+\)\s*$").expect("valid suffix regex"));

/// One stable identity and the names it has used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    pub id: String,
    pub display_name: String,
    /// Earlier display names, oldest first, without duplicates.
    pub history: Vec<String>,
    /// Store-wide counter value of the last update; higher is more recent.
    pub revision: u64,
}

impl IdentityRecord {
    /// Whether the current display name carries a `(N)` duplicate suffix.
    pub fn has_suffix(&self) -> bool {
        SUFFIX_PATTERN.is_match(&self.display_name)
    }

    fn knows(&self, name: &str) -> bool {
        self.history.iter().any(|n| n == name)
    }
}

/// What a sighting changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SightingOutcome {
    /// First time this identity was seen.
    New,
    /// The identity was seen under a different name; `previous` moved to history.
    Renamed { previous: String },
    /// Same identity, same name.
    Unchanged,
}

/// On-disk layout, shared with the older tooling.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    steam_ids: BTreeMap<String, StoredName>,
    #[serde(rename = "duplicateSteamIDs", default)]
    duplicate_steam_ids: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredName {
    player_name: String,
    #[serde(default)]
    comment: String,
    #[serde(default)]
    revision: u64,
}

/// Identity map backed by a JSON file.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
    records: BTreeMap<String, IdentityRecord>,
    next_revision: u64,
}

impl IdentityStore {
    /// Create an empty store that will persist to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: BTreeMap::new(),
            next_revision: 1,
        }
    }

    /// Load the store from `path`.
    ///
    /// A missing file yields an empty store; the file is created on the
    /// first mutation.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new(path)),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read identity store: {}", path.display())
                });
            },
        };

        let file: StoreFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse identity store: {}", path.display()))?;

        let mut store = Self::new(path);
        store.apply_file(file);
        Ok(store)
    }

    fn apply_file(&mut self, mut file: StoreFile) {
        let mut max_revision = 0;
        for (id, stored) in file.steam_ids {
            let mut history = Vec::new();
            for name in file.duplicate_steam_ids.remove(&id).unwrap_or_default() {
                if !history.contains(&name) {
                    history.push(name);
                }
            }
            max_revision = max_revision.max(stored.revision);
            self.records.insert(
                id.clone(),
                IdentityRecord {
                    id,
                    display_name: stored.player_name,
                    history,
                    revision: stored.revision,
                },
            );
        }
        self.next_revision = max_revision + 1;
    }

    fn to_file(&self) -> StoreFile {
        let mut file = StoreFile::default();
        for (id, record) in &self.records {
            let comment = if record.has_suffix() {
                constants::SUFFIX_COMMENT.to_string()
            } else {
                String::new()
            };
            file.steam_ids.insert(
                id.clone(),
                StoredName {
                    player_name: record.display_name.clone(),
                    comment,
                    revision: record.revision,
                },
            );
            if !record.history.is_empty() {
                file.duplicate_steam_ids
                    .insert(id.clone(), record.history.clone());
            }
        }
        file
    }

    /// Path the store persists to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&IdentityRecord> {
        self.records.get(id)
    }

    pub fn records(&self) -> impl Iterator<Item = &IdentityRecord> {
        self.records.values()
    }

    /// Record that `id` was seen as `name`, without persisting.
    ///
    /// When the identity was known under another name, that name moves into
    /// the history before the current name is overwritten.
    pub fn record_sighting(&mut self, name: &str, id: &str) -> SightingOutcome {
        let revision = self.next_revision;

        let outcome = match self.records.get_mut(id) {
            Some(record) if record.display_name == name => return SightingOutcome::Unchanged,
            Some(record) => {
                let previous = std::mem::replace(&mut record.display_name, name.to_string());
                if !record.knows(&previous) {
                    record.history.push(previous.clone());
                }
                record.revision = revision;
                SightingOutcome::Renamed { previous }
            },
            None => {
                self.records.insert(
                    id.to_string(),
                    IdentityRecord {
                        id: id.to_string(),
                        display_name: name.to_string(),
                        history: Vec::new(),
                        revision,
                    },
                );
                SightingOutcome::New
            },
        };

        self.next_revision += 1;
        outcome
    }

    /// Find the identity currently or previously using `name`.
    ///
    /// Current names are checked before historical ones, so a name that is
    /// live for one identity never resolves to another identity that merely
    /// used it in the past. Among several candidates of the same kind the
    /// most recently updated identity wins.
    pub fn lookup(&self, name: &str) -> Option<&IdentityRecord> {
        let current = self
            .records
            .values()
            .filter(|r| r.display_name == name)
            .max_by_key(|r| r.revision);
        if current.is_some() {
            return current;
        }

        self.records
            .values()
            .filter(|r| r.knows(name))
            .max_by_key(|r| r.revision)
    }

    /// Write the whole store to disk, replacing the previous file atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn persist(&self) -> Result<()> {
        write_store_file(&self.path, &self.to_file())
    }

    /// Async version of `persist` that writes on the blocking pool.
    pub async fn persist_async(&self) -> Result<()> {
        let path = self.path.clone();
        let file = self.to_file();
        tokio::task::spawn_blocking(move || write_store_file(&path, &file))
            .await
            .context("Task join error")?
    }
}

fn write_store_file(path: &Path, file: &StoreFile) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let json = serde_json::to_vec_pretty(file).context("Failed to serialize identity store")?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)
        .context("Failed to create temporary identity store file")?;
    tmp.write_all(&json)
        .context("Failed to write identity store")?;
    tmp.persist(path)
        .with_context(|| format!("Failed to replace identity store: {}", path.display()))?;

    Ok(())
}
