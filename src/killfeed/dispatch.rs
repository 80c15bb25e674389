//! Rendering and delivery of kill feed notifications.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use super::event::ClassifiedEvent;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("webhook rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Something that can deliver a rendered message.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str) -> Result<(), DispatchError>;
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
}

/// Posts `{"content": ...}` to a Discord-style webhook.
///
/// Only `204 No Content` counts as delivered.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, url))
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, message: &str) -> Result<(), DispatchError> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookPayload { content: message })
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(DispatchError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// Human-readable announcement for an event.
pub fn render_message(event: &ClassifiedEvent) -> String {
    match event {
        ClassifiedEvent::KilledWithWeapon {
            subject,
            actor,
            weapon,
            ..
        } => format!("**{subject}** was killed by **{actor}** with a **{weapon}**!"),
        ClassifiedEvent::KilledBy { subject, actor } => {
            format!("**{subject}** was killed by **{actor}**!")
        },
        ClassifiedEvent::Killed { subject } => format!("**{subject}** died!"),
        ClassifiedEvent::Fell { subject } => format!("**{subject}** fell to their death!"),
        ClassifiedEvent::BledOut { subject } => format!("**{subject}** has bled out!"),
        ClassifiedEvent::KilledByInfected { subject } => {
            format!("**{subject}** got killed by an Infected!")
        },
        ClassifiedEvent::Mauled { subject, animal } => {
            format!("**{subject}** was mauled to death by a {animal}!")
        },
        ClassifiedEvent::Beaten { subject, actor, .. } => {
            format!("**{subject}** has been beaten to a pulp by **{actor}**!")
        },
        ClassifiedEvent::Poisoned { subject } => {
            format!("**{subject}** died from Chemical Poisoning!")
        },
    }
}

/// Renders events and hands them to a [`Notifier`], logging the outcome.
///
/// Delivery is at most once: failures are logged and never retried.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    pub async fn dispatch(&self, event: &ClassifiedEvent) -> Result<(), DispatchError> {
        let message = render_message(event);
        match self.notifier.send(&message).await {
            Ok(()) => {
                info!(kind = %event.kind(), message = %message, "Notification sent");
                Ok(())
            },
            Err(e) => {
                warn!(kind = %event.kind(), message = %message, error = %e, "Failed to send notification");
                Err(e)
            },
        }
    }
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher").finish_non_exhaustive()
    }
}
