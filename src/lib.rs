//! dzkeeper keeps a DayZ dedicated server running unattended and announces
//! in-game deaths to a Discord channel.
//!
//! - [`process`] launches the server, restarts it after crashes and
//!   confirms it is listed by the public launcher.
//! - [`killfeed`] tails the server log, classifies kill feed lines,
//!   resolves names to Steam identities and posts notifications, but only
//!   while players are online.
//! - [`identity`] keeps the durable name-to-identity map.
//! - [`manager`] wires both halves together for the CLI.

pub mod commands;
pub mod config;
pub mod constants;
pub mod identity;
pub mod killfeed;
pub mod logging;
pub mod logs;
pub mod manager;
pub mod mods;
pub mod process;
pub mod reliability;
pub mod ui;
pub mod utils;
