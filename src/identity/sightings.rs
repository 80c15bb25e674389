//! Player sightings in server logs.
//!
//! The server logs `Player "<name>" (steamid=<id>)` whenever a player
//! connects or is otherwise reported. These pairings are the only source of
//! display-name to Steam ID mappings.

use anyhow::{Context, Result};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{info, warn};

use super::store::{IdentityStore, SightingOutcome};
use crate::logs;

static SIGHTING_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Player "(?P<name>.+?)"\s*\((?i:steamid)=(?P<id>\d+)\)"#)
        .expect("valid sighting regex")
});

/// A display name reported together with its stable identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sighting {
    pub name: String,
    pub id: String,
}

/// Extract a sighting from a log line, if it carries one.
pub fn parse_sighting(line: &str) -> Option<Sighting> {
    let caps = SIGHTING_PATTERN.captures(line)?;
    let name = caps["name"].trim();
    if name.is_empty() {
        return None;
    }
    Some(Sighting {
        name: name.to_string(),
        id: caps["id"].to_string(),
    })
}

/// Totals of an ingestion run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub files: usize,
    pub sightings: usize,
    pub new_identities: usize,
    pub renames: usize,
}

/// Result of catching up on the complete lines already in one log file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CatchUp {
    /// Byte offset just past the last complete line.
    pub consumed: u64,
    pub sightings: usize,
    /// Sightings that added or renamed an identity.
    pub changes: usize,
}

/// Feed the sightings in the complete lines of `path` into `store`,
/// without persisting. A trailing unterminated line is left for the tailer.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn observe_log_prefix(path: &Path, store: &mut IdentityStore) -> Result<CatchUp> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let consumed = bytes.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);

    let mut scan = CatchUp {
        consumed: consumed as u64,
        ..CatchUp::default()
    };
    for line in String::from_utf8_lossy(&bytes[..consumed]).lines() {
        let Some(sighting) = parse_sighting(line) else {
            continue;
        };
        scan.sightings += 1;
        if store.record_sighting(&sighting.name, &sighting.id) != SightingOutcome::Unchanged {
            scan.changes += 1;
        }
    }
    Ok(scan)
}

/// Feed every sighting in every log file of `dir` into `store`, oldest
/// file first, then persist once.
///
/// Unreadable files are skipped with a warning so one damaged log does not
/// block the rest.
///
/// # Errors
///
/// Returns an error if the directory cannot be listed or the store cannot
/// be written.
pub fn ingest_directory(
    dir: &Path,
    extension: &str,
    store: &mut IdentityStore,
) -> Result<IngestSummary> {
    let mut summary = IngestSummary::default();

    for path in logs::log_files(dir, extension)? {
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable log file");
                continue;
            },
        };
        summary.files += 1;

        for line in String::from_utf8_lossy(&bytes).lines() {
            let Some(sighting) = parse_sighting(line) else {
                continue;
            };
            summary.sightings += 1;
            match store.record_sighting(&sighting.name, &sighting.id) {
                SightingOutcome::New => summary.new_identities += 1,
                SightingOutcome::Renamed { .. } => summary.renames += 1,
                SightingOutcome::Unchanged => {},
            }
        }
    }

    store
        .persist()
        .context("Failed to persist identity store after ingestion")?;

    info!(
        files = summary.files,
        sightings = summary.sightings,
        identities = store.len(),
        renames = summary.renames,
        "Identity ingestion complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_parse_sighting() {
        let line = r#"12:01:33 | Player "Bob(2)" (steamid=76561198000000001) is connected"#;
        assert_eq!(
            parse_sighting(line),
            Some(Sighting {
                name: "Bob(2)".to_string(),
                id: "76561198000000001".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_sighting_case_and_spacing() {
        let line = r#"Player "Eve"(steamID=123)"#;
        assert_eq!(parse_sighting(line).unwrap().id, "123");
    }

    #[test]
    fn test_parse_sighting_rejects_other_lines() {
        assert!(parse_sighting("[Killfeed] Bob bled out.").is_none());
        assert!(parse_sighting(r#"Player "Bob" (id=abc)"#).is_none());
        assert!(parse_sighting(r#"Player "" (steamid=1)"#).is_none());
    }

    #[test]
    fn test_observe_log_prefix_stops_at_last_complete_line() -> Result<()> {
        let dir = TempDir::new()?;
        let log = dir.path().join("server.log");
        let complete = "Player \"Bob\" (steamid=42) is connected\n[Killfeed] Bob bled out.\n";
        std::fs::write(&log, format!("{complete}Player \"Eve\" (steam"))?;
        let mut store = IdentityStore::new(dir.path().join("steam_ids.json"));

        let scan = observe_log_prefix(&log, &mut store)?;
        assert_eq!(scan.consumed, complete.len() as u64);
        assert_eq!(scan.sightings, 1);
        assert_eq!(scan.changes, 1);
        assert_eq!(store.lookup("Bob").map(|r| r.id.as_str()), Some("42"));
        assert!(store.lookup("Eve").is_none());

        // Already known: seen again but nothing changes.
        assert_eq!(observe_log_prefix(&log, &mut store)?.changes, 0);
        // Nothing is persisted by the scan itself.
        assert!(!dir.path().join("steam_ids.json").exists());
        Ok(())
    }

    #[test]
    fn test_ingest_directory() -> Result<()> {
        let dir = TempDir::new()?;
        std::fs::write(
            dir.path().join("server_1.log"),
            "Player \"Bob\" (steamid=42) is connected\nnoise\n",
        )?;
        std::thread::sleep(Duration::from_millis(20));
        std::fs::write(
            dir.path().join("server_2.log"),
            "Player \"Bob(2)\" (steamid=42) is connected\nPlayer \"Eve\" (steamid=9) is connected\n",
        )?;

        let path = dir.path().join("steam_ids.json");
        let mut store = IdentityStore::new(&path);
        let summary = ingest_directory(dir.path(), "log", &mut store)?;

        assert_eq!(summary.files, 2);
        assert_eq!(summary.sightings, 3);
        assert_eq!(summary.new_identities, 2);
        assert_eq!(summary.renames, 1);

        let loaded = IdentityStore::open(&path)?;
        let bob = loaded.get("42").unwrap();
        assert_eq!(bob.display_name, "Bob(2)");
        assert_eq!(bob.history, vec!["Bob"]);
        Ok(())
    }
}
