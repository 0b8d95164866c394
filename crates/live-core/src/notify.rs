//! Transition notifications.
//!
//! The poller hands every detected edge to a [`NotificationSink`]. The
//! [`WebhookSink`] formats a chat message and POSTs it once to a
//! Discord-style webhook. Delivery is best effort: a failure is reported to
//! the caller, logged there, and never retried.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use crate::detector::Edge;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP {status} from webhook {url}")]
    Http { url: String, status: u16 },
    #[error("Request to webhook {url} failed: {reason}")]
    Request { url: String, reason: String },
    #[error("Failed to sign webhook payload: {0}")]
    Signing(String),
}

/// Delivers one transition to an audience.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, name: &str, edge: Edge, at: DateTime<Utc>) -> Result<(), NotifyError>;
}

/// Configuration for the webhook endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// The URL to POST messages to.
    pub url: String,

    /// Role mentioned at the start of every message, e.g. `<@&{role_id}>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,

    /// Prefix joined with the channel name to build the link in the message.
    #[serde(default = "default_channel_url_base")]
    pub channel_url_base: String,

    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,

    /// Optional HMAC-SHA256 signing secret for the `X-Signature-256` header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

fn default_channel_url_base() -> String {
    "https://www.twitch.tv/".into()
}

fn default_webhook_timeout_ms() -> u64 {
    5000
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            role_id: None,
            channel_url_base: default_channel_url_base(),
            timeout_ms: default_webhook_timeout_ms(),
            secret: None,
        }
    }

    pub fn with_role_id(mut self, role_id: impl Into<String>) -> Self {
        self.role_id = Some(role_id.into());
        self
    }
}

/// The JSON body POSTed to the webhook.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub content: String,
}

/// Renders the chat message for a transition.
///
/// `<t:..:F>` and `<t:..:R>` are Discord timestamp markups (full date and
/// relative time), rendered in each reader's own timezone.
pub fn format_message(config: &WebhookConfig, name: &str, edge: Edge, at: DateTime<Utc>) -> String {
    let ts = at.timestamp();
    let mention = config
        .role_id
        .as_deref()
        .filter(|r| !r.is_empty())
        .map(|r| format!("<@&{}> ", r))
        .unwrap_or_default();
    format!(
        "{}<t:{ts}:F> <t:{ts}:R> - [{name}]({}{name}) is {}!",
        mention,
        config.channel_url_base,
        edge.status_word(),
    )
}

pub struct WebhookSink {
    config: WebhookConfig,
    client: Client,
}

impl WebhookSink {
    pub fn new(config: WebhookConfig, client: Client) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &WebhookConfig {
        &self.config
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn notify(&self, name: &str, edge: Edge, at: DateTime<Utc>) -> Result<(), NotifyError> {
        let payload = WebhookPayload {
            content: format_message(&self.config, name, edge, at),
        };
        let body = serde_json::to_vec(&payload).map_err(|e| NotifyError::Request {
            url: self.config.url.clone(),
            reason: e.to_string(),
        })?;

        let mut req = self
            .client
            .post(&self.config.url)
            .header("Content-Type", "application/json")
            .header("User-Agent", concat!("live-alert/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_millis(self.config.timeout_ms));

        if let Some(secret) = self.config.secret.as_deref() {
            let signature = sign_payload(&body, secret)?;
            req = req.header("X-Signature-256", format!("sha256={}", signature));
        }

        match req.body(body).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(channel = name, %edge, "Webhook delivered");
                Ok(())
            }
            Ok(resp) => Err(NotifyError::Http {
                url: self.config.url.clone(),
                status: resp.status().as_u16(),
            }),
            Err(e) => Err(NotifyError::Request {
                url: self.config.url.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

fn sign_payload(body: &[u8], secret: &str) -> Result<String, NotifyError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| NotifyError::Signing(e.to_string()))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}
