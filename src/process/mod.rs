//! Game server process supervision.
//!
//! ## Module Structure
//!
//! - [`launch`]: Launch arguments, spawning and termination
//! - [`readiness`]: Post-start launcher query
//! - [`supervisor`]: Liveness polling and crash restart

pub mod launch;
pub mod readiness;
pub mod supervisor;

pub use launch::{CommandLauncher, LaunchSpec, Liveness, ServerLauncher, ServerProcess};
pub use readiness::{LauncherQuery, ReadinessCheck, ReadinessError, classify_query_response};
pub use supervisor::{ProcessSupervisor, SupervisorState};
