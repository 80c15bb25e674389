//! CLI command implementations for dzkeeper.
//!
//! - [`run`] - Supervised server and/or kill feed until interrupted
//! - [`genmods`] - Mod list generation
//! - [`ingest`] - Bulk identity ingestion from existing logs
//! - [`check`] - Configuration validation

pub mod check;
pub mod genmods;
pub mod ingest;
pub mod run;
