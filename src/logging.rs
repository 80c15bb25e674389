//! Tracing subscriber setup.

use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::{LogFormat, LoggingConfig};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Build the filter: `RUST_LOG` when set, otherwise the configured level.
fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Install the global subscriber. Call once, before any task is spawned.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = env_filter(config);
    let timer = ChronoLocal::new(TIMESTAMP_FORMAT.to_string());

    match config.format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_timer(timer).with_target(false))
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_timer(timer))
            .init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_uses_configured_level() {
        // RUST_LOG takes precedence and cannot be cleared without unsafe code.
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LoggingConfig {
            level: "dzkeeper=debug,warn".to_string(),
            format: LogFormat::Pretty,
        };
        assert_eq!(env_filter(&config).to_string(), "dzkeeper=debug,warn");
    }
}
