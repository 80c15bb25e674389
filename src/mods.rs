//! The server's mod list.
//!
//! Mods are folders whose names start with `@`, anywhere below the mods
//! root. The generated list puts the configured priority mods first (load
//! order matters for frameworks), then every other discovered folder,
//! minus the names listed in the ignore file.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

use crate::config::ModsConfig;
use crate::utils::parse_list;

/// Names of every `@`-prefixed directory below `root`, deduplicated, in
/// discovery order.
pub fn find_mod_folders(root: &Path) -> Result<Vec<String>> {
    let pattern = format!("{}/**/@*", glob::Pattern::escape(&root.to_string_lossy()));
    let mut seen = HashSet::new();
    let mut found = Vec::new();

    for entry in glob::glob(&pattern).with_context(|| format!("Invalid mod pattern: {pattern}"))? {
        let Ok(path) = entry else { continue };
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if seen.insert(name.to_string()) {
            found.push(name.to_string());
        }
    }
    Ok(found)
}

/// Read a list file, treating a missing file as empty.
fn read_list_or_empty(path: &Path) -> Result<Vec<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(parse_list(&content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

/// Order the final list: priority mods, then discovered mods not ignored.
pub fn build_mod_list(discovered: &[String], ignored: &[String], priority: &[String]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut list = Vec::new();

    for name in priority {
        if seen.insert(name) {
            list.push(name.clone());
        }
    }
    for name in discovered {
        if ignored.iter().any(|i| i == name) {
            continue;
        }
        if seen.insert(name) {
            list.push(name.clone());
        }
    }
    list
}

/// Scan `config.root_dir` and write the mod list to `output`, one mod per
/// line.
///
/// # Errors
///
/// Returns an error if the ignore file exists but is unreadable, or the
/// output cannot be written.
pub fn generate_mod_list(config: &ModsConfig, output: &Path) -> Result<Vec<String>> {
    let discovered = find_mod_folders(&config.root_dir)?;
    let ignored = read_list_or_empty(&config.ignore_file)?;

    for name in &config.priority {
        if !discovered.contains(name) {
            warn!(mod_name = %name, root = %config.root_dir.display(), "Priority mod not found on disk");
        }
    }

    let list = build_mod_list(&discovered, &ignored, &config.priority);
    let mut content = list.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    std::fs::write(output, content)
        .with_context(|| format!("Failed to write mod list: {}", output.display()))?;

    info!(
        mods = list.len(),
        discovered = discovered.len(),
        ignored = ignored.len(),
        path = %output.display(),
        "Mod list generated"
    );
    Ok(list)
}

/// Read the mod list used for launching. A missing file means no mods.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn read_mod_list(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        warn!(path = %path.display(), "Mod list not found, launching without mods");
    }
    read_list_or_empty(path)
}
