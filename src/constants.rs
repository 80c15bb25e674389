//! Default intervals, limits and file names.
//!
//! Every suspension point of the long-running tasks is named here so the
//! timing of the whole process can be read in one place. All values can be
//! overridden from `dzkeeper.toml`.

// =============================================================================
// Log tailing
// =============================================================================

/// Backoff when no log file matches the selection rule.
pub const NO_LOG_FILE_BACKOFF_SECS: u64 = 5;

/// Sleep between read attempts when no full line is available.
pub const TAIL_POLL_INTERVAL_MS: u64 = 1000;
/// Upper bound on the tail sleep so notifications stay near real time.
pub const MAX_TAIL_POLL_INTERVAL_MS: u64 = 1000;

/// Extension of the server log files that are tailed.
pub const DEFAULT_LOG_EXTENSION: &str = "log";

// =============================================================================
// Activation
// =============================================================================

/// Interval between occupancy polls.
pub const OCCUPANCY_POLL_INTERVAL_SECS: u64 = 30;

/// Timeout for a single outbound HTTP request.
pub const HTTP_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// Process supervision
// =============================================================================

/// Interval between liveness polls of the server process.
pub const LIVENESS_POLL_INTERVAL_SECS: u64 = 10;

/// Pause between crash detection and the restart.
pub const CRASH_RESTART_DELAY_SECS: u64 = 10;

/// Pause between stop and start on an operator restart.
pub const OPERATOR_RESTART_DELAY_SECS: u64 = 2;

/// How long a stopping server may take before it is killed.
pub const STOP_GRACE_SECS: u64 = 30;

/// Warm-up before the first readiness query.
pub const READINESS_WARMUP_SECS: u64 = 80;

/// Readiness query attempts after the first one.
pub const READINESS_MAX_RETRIES: u32 = 15;

/// Fixed delay between readiness query attempts.
pub const READINESS_RETRY_DELAY_SECS: u64 = 30;

// =============================================================================
// Server launch
// =============================================================================

pub const DEFAULT_SERVER_EXECUTABLE: &str = "./DayZServer_x64";
pub const DEFAULT_PROFILES_DIR: &str = "Profiles";
pub const DEFAULT_SERVER_PORT: u16 = 2302;
pub const DEFAULT_QUERY_PORT: u16 = 27016;
pub const DEFAULT_MAX_MEM_MB: u32 = 2048;
pub const DEFAULT_CPU_CORES: u32 = 4;
pub const DEFAULT_EXTRA_FLAGS: &[&str] = &["-dologs", "-adminlog", "-netlog", "-freezecheck"];

/// Public launcher API the readiness query is sent to.
pub const DZSA_QUERY_BASE: &str = "http://dayzsalauncher.com/api/v1/query";

// =============================================================================
// Identities
// =============================================================================

/// Faction name the server uses for its AI raiders; always treated as a bot.
pub const AI_FACTION_NAME: &str = "AI Survivor (Raiders)";

/// Annotation stored next to display names carrying a duplicate suffix.
pub const SUFFIX_COMMENT: &str = "This player has a suffix";

// =============================================================================
// Files
// =============================================================================

pub const DEFAULT_CONFIG_FILE: &str = "dzkeeper.toml";
pub const CONFIG_ENV_VAR: &str = "DZKEEPER_CONFIG";
pub const DEFAULT_IDENTITY_FILE: &str = "steam_ids.json";
pub const DEFAULT_UNRESOLVED_LOG: &str = "unreported_players.txt";
pub const DEFAULT_MODS_FILE: &str = "mods.txt";
pub const DEFAULT_IGNORE_FILE: &str = "ignore.txt";
