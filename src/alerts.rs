//! Alert delivery
//!
//! An [`AlertSender`] delivers one already formatted alert message. The
//! monitor loop decides *what* to send and *when*; senders only transport.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::config::{SenderConfig, Webhook};
use crate::discord::DiscordSender;

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("failed to deliver alert: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("alert endpoint answered with status {status}")]
    Status { status: StatusCode, body: String },
}

/// Delivers alert messages to a channel
#[async_trait]
pub trait AlertSender: Send + Sync {
    async fn send(&self, network: &str, message: &str) -> Result<(), SendError>;
}

/// Build the sender selected in the configuration
pub fn sender_from_config(config: &SenderConfig) -> Arc<dyn AlertSender> {
    match config {
        SenderConfig::Log => Arc::new(LogSender),
        SenderConfig::Webhook(webhook) => Arc::new(WebhookSender::new(webhook.clone())),
        SenderConfig::Discord(discord) => Arc::new(DiscordSender::new(discord.clone())),
    }
}

/// Writes alerts to the log at warn level
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSender;

#[async_trait]
impl AlertSender for LogSender {
    async fn send(&self, network: &str, message: &str) -> Result<(), SendError> {
        warn!(network, "{message}");
        Ok(())
    }
}

/// Posts alerts as JSON to a generic webhook
///
/// Payload: `{"message": ..., "network": ..., "timestamp": <rfc3339>}`
#[derive(Debug, Clone)]
pub struct WebhookSender {
    client: Client,
    webhook: Webhook,
}

impl WebhookSender {
    pub fn new(webhook: Webhook) -> Self {
        Self {
            client: Client::new(),
            webhook,
        }
    }
}

#[async_trait]
impl AlertSender for WebhookSender {
    #[instrument(skip(self, message))]
    async fn send(&self, network: &str, message: &str) -> Result<(), SendError> {
        let payload = json!({
            "message": message,
            "network": network,
            "timestamp": Utc::now().to_rfc3339()
        });

        let response = self
            .client
            .post(&self.webhook.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to send webhook alert: {}", e);
                SendError::Transport(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            error!("Webhook alert failed with status: {}", status);
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::Status { status, body });
        }

        info!("Successfully sent webhook alert");
        Ok(())
    }
}
