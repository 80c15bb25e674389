//! Post-start readiness confirmation.
//!
//! After the server has had time to boot, the public launcher API is asked
//! to query it. A successful query makes the server visible to clients; an
//! "invalid workshop item" answer means a mod needs operator attention.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;
use tracing::{error, info};

use crate::config::Config;
use crate::reliability::{RetryConfig, retry_async};

static INVALID_WORKSHOP_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""error"\s*:\s*"steam workshop id not found - (\d+)""#)
        .expect("valid workshop error regex")
});

const QUERY_TIMEOUT_MARKER: &str = r#""error":"Timeout has occurred""#;

#[derive(Debug, Error)]
pub enum ReadinessError {
    /// A mod references a workshop item that no longer exists.
    #[error("invalid steam workshop item {id}, remove or update the mod")]
    InvalidWorkshopItem { id: String },

    #[error("launcher query timed out")]
    QueryTimeout,

    #[error("launcher query returned status {0}")]
    Status(u16),

    #[error("launcher query failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ReadinessError {
    /// Every failure except an invalid workshop item may clear up on its own.
    pub fn is_retriable(&self) -> bool {
        !matches!(self, Self::InvalidWorkshopItem { .. })
    }
}

/// Classify a launcher query response.
pub fn classify_query_response(status: u16, body: &str) -> Result<(), ReadinessError> {
    if let Some(caps) = INVALID_WORKSHOP_ITEM.captures(body) {
        return Err(ReadinessError::InvalidWorkshopItem {
            id: caps[1].to_string(),
        });
    }
    if body.contains(QUERY_TIMEOUT_MARKER) {
        return Err(ReadinessError::QueryTimeout);
    }
    if !(200..300).contains(&status) {
        return Err(ReadinessError::Status(status));
    }
    Ok(())
}

/// One complete readiness confirmation, including any warm-up.
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    async fn confirm(&self) -> Result<(), ReadinessError>;
}

/// Queries the launcher API after a warm-up delay, retrying at a fixed
/// interval.
#[derive(Debug, Clone)]
pub struct LauncherQuery {
    client: reqwest::Client,
    endpoint: String,
    warmup: Duration,
    retry: RetryConfig,
}

impl LauncherQuery {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        warmup: Duration,
        retry: RetryConfig,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            warmup,
            retry,
        }
    }

    /// Build from `[readiness]`, or `None` when readiness is disabled or no
    /// endpoint can be derived.
    pub fn from_config(config: &Config, client: reqwest::Client) -> Option<Self> {
        let endpoint = config.readiness_endpoint()?;
        Some(Self::new(
            client,
            endpoint,
            Duration::from_secs(config.readiness.warmup_secs),
            RetryConfig::fixed(
                config.readiness.max_retries,
                Duration::from_secs(config.readiness.retry_delay_secs),
            ),
        ))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn query_once(&self) -> Result<(), ReadinessError> {
        let response = self.client.get(&self.endpoint).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        classify_query_response(status, &body)
    }
}

#[async_trait]
impl ReadinessCheck for LauncherQuery {
    async fn confirm(&self) -> Result<(), ReadinessError> {
        tokio::time::sleep(self.warmup).await;
        info!(endpoint = %self.endpoint, "Updating launcher listing");
        retry_async(self.retry, || self.query_once(), ReadinessError::is_retriable).await
    }
}

/// Run a confirmation and report its outcome. Spawned after every launch.
pub async fn confirm_and_report(check: Arc<dyn ReadinessCheck>) {
    match check.confirm().await {
        Ok(()) => info!("Launcher update successful"),
        Err(ReadinessError::InvalidWorkshopItem { id }) => error!(
            workshop_id = %id,
            "There is an invalid steam workshop mod ({id}), please remove it or update it"
        ),
        Err(e) => error!(error = %e, "Launcher update failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_success() {
        assert!(classify_query_response(200, r#"{"status":0,"result":{"players":0}}"#).is_ok());
    }

    #[test]
    fn test_classify_invalid_workshop_item() {
        let err = classify_query_response(
            200,
            r#"{"status":1,"error":"steam workshop id not found - 1559212036"}"#,
        )
        .unwrap_err();
        assert!(matches!(
            &err,
            ReadinessError::InvalidWorkshopItem { id } if id == "1559212036"
        ));
        assert!(!err.is_retriable());
    }

    #[test]
    fn test_classify_timeout_and_status() {
        let err = classify_query_response(200, r#"{"status":1,"error":"Timeout has occurred"}"#)
            .unwrap_err();
        assert!(matches!(err, ReadinessError::QueryTimeout));
        assert!(err.is_retriable());

        let err = classify_query_response(502, "Bad Gateway").unwrap_err();
        assert!(matches!(err, ReadinessError::Status(502)));
        assert!(err.is_retriable());
    }

    #[test]
    fn test_from_config_requires_endpoint() {
        let mut config: Config = toml::from_str(
            r#"
[server]
dir = "."

[killfeed]
log_dir = "."
webhook_url = "https://discord.com/api/webhooks/1/abc"
occupancy_url = "http://127.0.0.1/status"
"#,
        )
        .unwrap();
        let client = reqwest::Client::new();
        assert!(LauncherQuery::from_config(&config, client.clone()).is_none());

        config.server.public_endpoint = Some("203.0.113.7".to_string());
        let query = LauncherQuery::from_config(&config, client).unwrap();
        assert_eq!(
            query.endpoint(),
            "http://dayzsalauncher.com/api/v1/query/203.0.113.7/27016"
        );
        assert_eq!(query.retry.max_retries, 15);
        assert_eq!(query.warmup, Duration::from_secs(80));
    }
}
