//! `dzkeeper ingest` - learn identities from every existing log file.
//!
//! The kill feed only sees lines written while it runs. This scans the
//! whole log directory so players who connected earlier resolve too.

use anyhow::Result;

use crate::config::Config;
use crate::identity::{IdentityStore, ingest_directory};

pub fn execute(config: &Config) -> Result<()> {
    let killfeed = &config.killfeed;
    let mut store = IdentityStore::open(&killfeed.identity_file)?;
    let before = store.len();
    let summary = ingest_directory(&killfeed.log_dir, &killfeed.log_extension, &mut store)?;

    println!(
        "Scanned {} files, {} sightings: {} new identities, {} renames ({} -> {} total)",
        summary.files,
        summary.sightings,
        summary.new_identities,
        summary.renames,
        before,
        store.len()
    );
    Ok(())
}
