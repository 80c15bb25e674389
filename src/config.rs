//! Configuration types for dzkeeper.
//!
//! This module loads and validates `dzkeeper.toml`. It includes:
//!
//! - [`Config`] - Root configuration struct
//! - [`ServerConfig`] - Server executable, launch flags and mod list location
//! - [`SupervisorConfig`] - Liveness polling and restart timing
//! - [`ReadinessConfig`] - Post-start launcher query
//! - [`KillfeedConfig`] - Log directory, webhook, identities and occupancy
//! - [`ModsConfig`] - Mod list generation
//! - [`LoggingConfig`] - Tracing output
//!
//! Every section except `[server]` and `[killfeed]` is optional and falls
//! back to the defaults in [`crate::constants`].

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants;

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if there are any warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// dzkeeper.toml configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    pub killfeed: KillfeedConfig,
    #[serde(default)]
    pub mods: ModsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server process settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Display name used in log output.
    #[serde(default)]
    pub name: String,
    /// Working directory of the server process.
    pub dir: PathBuf,
    #[serde(default = "default_executable")]
    pub executable: String,
    #[serde(default = "default_profiles_dir")]
    pub profiles_dir: String,
    /// Server config file passed as `-config=`.
    #[serde(default = "default_server_config_file")]
    pub config_file: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// Steam query port the launcher API queries.
    #[serde(default = "default_query_port")]
    pub query_port: u16,
    /// Public host or IP of the server, used to build the readiness endpoint.
    #[serde(default)]
    pub public_endpoint: Option<String>,
    #[serde(default = "default_max_mem")]
    pub max_mem_mb: u32,
    #[serde(default = "default_cpu_cores")]
    pub cpu_cores: u32,
    #[serde(default = "default_extra_flags")]
    pub extra_flags: Vec<String>,
    /// Mod list read on every start, one mod folder per line.
    #[serde(default = "default_mods_file")]
    pub mods_file: PathBuf,
    /// Start the server together with the kill feed in `dzkeeper run`.
    #[serde(default)]
    pub auto_start: bool,
}

fn default_executable() -> String {
    constants::DEFAULT_SERVER_EXECUTABLE.to_string()
}

fn default_profiles_dir() -> String {
    constants::DEFAULT_PROFILES_DIR.to_string()
}

fn default_server_config_file() -> String {
    "serverDZ.cfg".to_string()
}

fn default_server_port() -> u16 {
    constants::DEFAULT_SERVER_PORT
}

fn default_query_port() -> u16 {
    constants::DEFAULT_QUERY_PORT
}

fn default_max_mem() -> u32 {
    constants::DEFAULT_MAX_MEM_MB
}

fn default_cpu_cores() -> u32 {
    constants::DEFAULT_CPU_CORES
}

fn default_extra_flags() -> Vec<String> {
    constants::DEFAULT_EXTRA_FLAGS
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_mods_file() -> PathBuf {
    PathBuf::from(constants::DEFAULT_MODS_FILE)
}

/// Liveness polling and restart timing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub liveness_interval_secs: u64,
    pub restart_delay_secs: u64,
    pub operator_restart_delay_secs: u64,
    pub stop_grace_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            liveness_interval_secs: constants::LIVENESS_POLL_INTERVAL_SECS,
            restart_delay_secs: constants::CRASH_RESTART_DELAY_SECS,
            operator_restart_delay_secs: constants::OPERATOR_RESTART_DELAY_SECS,
            stop_grace_secs: constants::STOP_GRACE_SECS,
        }
    }
}

/// Readiness confirmation against the launcher query API.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub enabled: bool,
    /// Full query URL. Derived from `server.public_endpoint` when unset.
    pub endpoint: Option<String>,
    pub warmup_secs: u64,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            warmup_secs: constants::READINESS_WARMUP_SECS,
            max_retries: constants::READINESS_MAX_RETRIES,
            retry_delay_secs: constants::READINESS_RETRY_DELAY_SECS,
        }
    }
}

/// Kill feed settings.
#[derive(Debug, Clone, Deserialize)]
pub struct KillfeedConfig {
    /// Directory holding the rotating server logs.
    pub log_dir: PathBuf,
    #[serde(default = "default_log_extension")]
    pub log_extension: String,
    /// Discord-compatible webhook receiving the notifications.
    pub webhook_url: String,
    /// Endpoint reporting the current player count.
    pub occupancy_url: String,
    #[serde(default = "default_occupancy_interval")]
    pub occupancy_interval_secs: u64,
    #[serde(default = "default_identity_file")]
    pub identity_file: PathBuf,
    #[serde(default = "default_unresolved_log")]
    pub unresolved_log: PathBuf,
    /// Case-insensitive name fragments identifying AI characters.
    #[serde(default)]
    pub bot_names: Vec<String>,
    /// Dispatch events whose subject is a bot.
    #[serde(default = "default_true")]
    pub send_bot_events: bool,
    #[serde(default = "default_tail_poll_interval")]
    pub tail_poll_interval_ms: u64,
    #[serde(default = "default_no_log_backoff")]
    pub no_log_backoff_secs: u64,
}

fn default_log_extension() -> String {
    constants::DEFAULT_LOG_EXTENSION.to_string()
}

fn default_occupancy_interval() -> u64 {
    constants::OCCUPANCY_POLL_INTERVAL_SECS
}

fn default_identity_file() -> PathBuf {
    PathBuf::from(constants::DEFAULT_IDENTITY_FILE)
}

fn default_unresolved_log() -> PathBuf {
    PathBuf::from(constants::DEFAULT_UNRESOLVED_LOG)
}

fn default_true() -> bool {
    true
}

fn default_tail_poll_interval() -> u64 {
    constants::TAIL_POLL_INTERVAL_MS
}

fn default_no_log_backoff() -> u64 {
    constants::NO_LOG_FILE_BACKOFF_SECS
}

/// Mod list generation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModsConfig {
    /// Directory searched recursively for `@`-prefixed mod folders.
    pub root_dir: PathBuf,
    /// Folder names to leave out, one per line.
    pub ignore_file: PathBuf,
    /// Mods that must load first, in this order.
    pub priority: Vec<String>,
    /// Regenerate `server.mods_file` before every operator start.
    pub generate_on_start: bool,
}

impl Default for ModsConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            ignore_file: PathBuf::from(constants::DEFAULT_IGNORE_FILE),
            priority: Vec::new(),
            generate_on_start: true,
        }
    }
}

/// Tracing output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Resolve which config file to load.
///
/// Resolution order:
/// 1. Explicit path (the `--config` flag)
/// 2. `DZKEEPER_CONFIG` environment variable (if set)
/// 3. `dzkeeper.toml` in the current directory
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(constants::CONFIG_ENV_VAR)
        && !path.is_empty()
    {
        return PathBuf::from(path);
    }

    PathBuf::from(constants::DEFAULT_CONFIG_FILE)
}

impl Config {
    /// Load configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read (IO error)
    /// - The file contains invalid TOML syntax
    /// - Required fields are missing or have invalid types
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Readiness query URL, if readiness confirmation can run.
    ///
    /// An explicit `[readiness].endpoint` wins; otherwise the launcher API
    /// URL is built from `server.public_endpoint` and `server.query_port`.
    pub fn readiness_endpoint(&self) -> Option<String> {
        if !self.readiness.enabled {
            return None;
        }
        if let Some(endpoint) = &self.readiness.endpoint {
            return Some(endpoint.clone());
        }
        self.server.public_endpoint.as_ref().map(|host| {
            format!(
                "{}/{host}/{}",
                constants::DZSA_QUERY_BASE,
                self.server.query_port
            )
        })
    }

    /// Validate configuration with comprehensive checks.
    ///
    /// Returns a `ValidationResult` containing any non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns an error listing every problem found when one or more
    /// settings would make a component unable to operate.
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // 1. Server
        if self.server.port == 0 {
            errors.push(
                "server.port cannot be 0. Use the game port (default: 2302)".to_string(),
            );
        }
        if self.server.executable.trim().is_empty() {
            errors.push("server.executable cannot be empty".to_string());
        }
        if self.server.cpu_cores == 0 {
            errors.push("server.cpu_cores cannot be 0".to_string());
        }
        if self.server.max_mem_mb == 0 {
            errors.push("server.max_mem_mb cannot be 0".to_string());
        }
        if !self.server.dir.exists() {
            warnings.push(format!(
                "Server directory does not exist: {}",
                self.server.dir.display()
            ));
        } else if !self.server.dir.is_dir() {
            errors.push(format!(
                "server.dir is not a directory: {}",
                self.server.dir.display()
            ));
        }

        // 2. Supervisor timing
        if self.supervisor.liveness_interval_secs == 0 {
            errors.push("supervisor.liveness_interval_secs cannot be 0".to_string());
        }

        // 3. Readiness
        if self.readiness.enabled {
            match self.readiness_endpoint() {
                Some(endpoint) => {
                    if let Err(e) = validate_http_url(&endpoint) {
                        errors.push(format!("readiness endpoint {e}"));
                    }
                },
                None => warnings.push(
                    "Readiness confirmation is enabled but neither readiness.endpoint nor \
                     server.public_endpoint is set; it will be skipped"
                        .to_string(),
                ),
            }
        }

        // 4. Kill feed
        if let Err(e) = validate_http_url(&self.killfeed.webhook_url) {
            errors.push(format!("killfeed.webhook_url {e}"));
        }
        if let Err(e) = validate_http_url(&self.killfeed.occupancy_url) {
            errors.push(format!("killfeed.occupancy_url {e}"));
        }
        if self.killfeed.occupancy_interval_secs == 0 {
            errors.push("killfeed.occupancy_interval_secs cannot be 0".to_string());
        }
        if self.killfeed.tail_poll_interval_ms == 0 {
            errors.push("killfeed.tail_poll_interval_ms cannot be 0".to_string());
        }
        if self.killfeed.tail_poll_interval_ms > constants::MAX_TAIL_POLL_INTERVAL_MS {
            errors.push(format!(
                "killfeed.tail_poll_interval_ms cannot exceed {} (got {})",
                constants::MAX_TAIL_POLL_INTERVAL_MS,
                self.killfeed.tail_poll_interval_ms
            ));
        }
        if self.killfeed.log_extension.trim().is_empty() {
            errors.push("killfeed.log_extension cannot be empty".to_string());
        }
        if !self.killfeed.log_dir.is_dir() {
            warnings.push(format!(
                "Log directory does not exist yet: {}",
                self.killfeed.log_dir.display()
            ));
        }
        if self.killfeed.bot_names.is_empty() {
            warnings.push(
                "killfeed.bot_names is empty; AI kills will be logged as unresolved players"
                    .to_string(),
            );
        }

        if !errors.is_empty() {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }

        Ok(ValidationResult { warnings })
    }
}

impl SupervisorConfig {
    pub fn liveness_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_interval_secs)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay_secs)
    }

    pub fn operator_restart_delay(&self) -> Duration {
        Duration::from_secs(self.operator_restart_delay_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

impl KillfeedConfig {
    pub fn occupancy_interval(&self) -> Duration {
        Duration::from_secs(self.occupancy_interval_secs)
    }

    pub fn tail_poll_interval(&self) -> Duration {
        Duration::from_millis(self.tail_poll_interval_ms)
    }

    pub fn no_log_backoff(&self) -> Duration {
        Duration::from_secs(self.no_log_backoff_secs)
    }
}

fn validate_http_url(raw: &str) -> std::result::Result<(), String> {
    if raw.trim().is_empty() {
        return Err("cannot be empty".to_string());
    }
    let parsed = url::Url::parse(raw).map_err(|e| format!("is not a valid URL ({e}): {raw}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("must use http or https (got: '{other}')")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[server]
dir = "."

[killfeed]
log_dir = "."
webhook_url = "https://discord.com/api/webhooks/1/abc"
occupancy_url = "http://127.0.0.1:8080/status"
bot_names = ["Wolf_AI"]
"#;

    fn minimal() -> Config {
        toml::from_str(MINIMAL).unwrap()
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = minimal();
        assert_eq!(config.server.port, constants::DEFAULT_SERVER_PORT);
        assert_eq!(config.server.executable, constants::DEFAULT_SERVER_EXECUTABLE);
        assert_eq!(
            config.server.extra_flags,
            vec!["-dologs", "-adminlog", "-netlog", "-freezecheck"]
        );
        assert_eq!(config.killfeed.log_extension, "log");
        assert!(config.killfeed.send_bot_events);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(!config.server.auto_start);
    }

    #[test]
    fn test_supervisor_defaults() {
        let config = minimal();
        assert_eq!(
            config.supervisor.liveness_interval(),
            Duration::from_secs(constants::LIVENESS_POLL_INTERVAL_SECS)
        );
        assert_eq!(
            config.supervisor.restart_delay(),
            Duration::from_secs(constants::CRASH_RESTART_DELAY_SECS)
        );
        assert_eq!(config.readiness.max_retries, constants::READINESS_MAX_RETRIES);
    }

    #[test]
    fn test_validate_valid_config() {
        let result = minimal().validate().unwrap();
        assert!(result.has_warnings()); // no readiness endpoint
    }

    #[test]
    fn test_validate_port_zero() {
        let mut config = minimal();
        config.server.port = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("server.port cannot be 0"));
    }

    #[test]
    fn test_validate_bad_webhook_url() {
        let mut config = minimal();
        config.killfeed.webhook_url = "discord webhook".to_string();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("killfeed.webhook_url"));
    }

    #[test]
    fn test_validate_non_http_scheme() {
        let mut config = minimal();
        config.killfeed.occupancy_url = "ftp://example.com/status".to_string();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("must use http or https"));
    }

    #[test]
    fn test_validate_multiple_errors() {
        let mut config = minimal();
        config.server.port = 0;
        config.server.cpu_cores = 0;
        config.killfeed.webhook_url = String::new();
        config.killfeed.occupancy_interval_secs = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("server.port"));
        assert!(err.contains("cpu_cores"));
        assert!(err.contains("webhook_url cannot be empty"));
        assert!(err.contains("occupancy_interval_secs"));
    }

    #[test]
    fn test_validate_tail_poll_interval_bounds() {
        let mut config = minimal();
        config.killfeed.tail_poll_interval_ms = 1000;
        assert!(config.validate().is_ok());

        config.killfeed.tail_poll_interval_ms = 1001;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("tail_poll_interval_ms cannot exceed 1000"));
    }

    #[test]
    fn test_validate_server_dir_not_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("not-a-dir");
        std::fs::write(&file_path, b"x").unwrap();

        let mut config = minimal();
        config.server.dir = file_path;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("not a directory"));
    }

    #[test]
    fn test_readiness_endpoint_derived_from_public_endpoint() {
        let mut config = minimal();
        config.server.public_endpoint = Some("203.0.113.7".to_string());
        config.server.query_port = 27016;
        assert_eq!(
            config.readiness_endpoint().as_deref(),
            Some("http://dayzsalauncher.com/api/v1/query/203.0.113.7/27016")
        );
    }

    #[test]
    fn test_readiness_endpoint_explicit_and_disabled() {
        let mut config = minimal();
        config.readiness.endpoint = Some("http://127.0.0.1:9000/query".to_string());
        assert_eq!(
            config.readiness_endpoint().as_deref(),
            Some("http://127.0.0.1:9000/query")
        );

        config.readiness.enabled = false;
        assert!(config.readiness_endpoint().is_none());
    }

    #[test]
    fn test_missing_killfeed_section_fails_to_parse() {
        let toml_str = r#"
[server]
dir = "."
"#;
        assert!(toml::from_str::<Config>(toml_str).is_err());
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = Config::load_from("/definitely/not/here/dzkeeper.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_complete_config() {
        let toml_str = r#"
[server]
name = "Chernarus PvE"
dir = "/srv/dayz"
port = 2402
query_port = 27116
public_endpoint = "play.example.net"
cpu_cores = 8
extra_flags = ["-dologs"]
auto_start = true

[supervisor]
liveness_interval_secs = 5
stop_grace_secs = 15

[readiness]
warmup_secs = 60

[killfeed]
log_dir = "/srv/dayz/Profiles"
webhook_url = "https://discord.com/api/webhooks/1/abc"
occupancy_url = "http://127.0.0.1/status"
send_bot_events = false

[mods]
root_dir = "/srv/dayz"
priority = ["@CF", "@Dabs Framework"]

[logging]
level = "debug"
format = "json"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 2402);
        assert_eq!(config.server.extra_flags, vec!["-dologs"]);
        assert!(config.server.auto_start);
        assert_eq!(config.supervisor.liveness_interval_secs, 5);
        assert_eq!(
            config.supervisor.restart_delay_secs,
            constants::CRASH_RESTART_DELAY_SECS
        );
        assert_eq!(config.readiness.warmup_secs, 60);
        assert!(!config.killfeed.send_bot_events);
        assert_eq!(config.mods.priority, vec!["@CF", "@Dabs Framework"]);
        assert_eq!(config.logging.format, LogFormat::Json);
    }
}
