//! Stable player identities.
//!
//! Display names in the kill feed change whenever the game appends a
//! duplicate suffix (`Bob(2)`), so notifications are reconciled against
//! Steam IDs learned from connection lines.
//!
//! ## Module Structure
//!
//! - [`store`]: Durable identity map with name history
//! - [`resolver`]: Name lookup, bot filtering and the unresolved log
//! - [`sightings`]: Parsing and bulk ingestion of `Player "..." (steamid=...)` lines

mod resolver;
mod sightings;
mod store;

pub use resolver::{BotFilter, IdentityResolver, Resolution};
pub use sightings::{
    CatchUp, IngestSummary, Sighting, ingest_directory, observe_log_prefix, parse_sighting,
};
pub use store::{IdentityRecord, IdentityStore, SightingOutcome};
