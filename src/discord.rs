use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info, instrument};

use crate::alerts::{AlertSender, SendError};
use crate::config::Discord;

/// Embed color for balance alerts (red)
const ALERT_COLOR: u32 = 15158332;

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl ToString) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            content: self.content,
            embeds: self.embeds,
        }
    }
}

/// Posts alerts to a Discord webhook
#[derive(Debug, Clone)]
pub struct DiscordSender {
    client: Client,
    discord: Discord,
}

impl DiscordSender {
    pub fn new(discord: Discord) -> Self {
        Self {
            client: Client::new(),
            discord,
        }
    }

    pub fn build_balance_embed(network: &str, alert: &str) -> Embed {
        Embed {
            title: Some("📉 Validator Balance Alert".to_string()),
            description: Some(alert.to_string()),
            color: Some(ALERT_COLOR),
            footer: Some(EmbedFooter {
                text: format!("validator-watcher ({network})"),
            }),
            timestamp: Some(Utc::now().to_rfc3339()),
        }
    }

    pub fn build_message(&self, network: &str, alert: &str) -> Message {
        let mut message_builder =
            MessageBuilder::new().add_embed(Self::build_balance_embed(network, alert));
        if let Some(user_id) = &self.discord.user_id {
            message_builder = message_builder.content(format!("📉 <@{user_id}>"));
        }
        message_builder.build()
    }
}

#[async_trait]
impl AlertSender for DiscordSender {
    #[instrument(skip(self, alert))]
    async fn send(&self, network: &str, alert: &str) -> Result<(), SendError> {
        let message = self.build_message(network, alert);

        let response = self
            .client
            .post(&self.discord.url)
            .json(&message)
            .send()
            .await
            .map_err(SendError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            error!("Discord message failed with status: {}", status);
            let body = response.text().await.unwrap_or_default();
            if !body.is_empty() {
                error!("Discord API error response: {}", body);
            }
            return Err(SendError::Status { status, body });
        }

        info!("Successfully sent Discord message");
        Ok(())
    }
}
