//! Discord bot DMs over the REST API

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::NotificationSink;
use crate::config::DiscordConfig;
use crate::swap::error::AdapterError;
use crate::swap::notify::Embed;

const SERVICE: &str = "discord";

#[derive(Serialize)]
struct OpenChannel<'a> {
    recipient_id: &'a str,
}

#[derive(Deserialize)]
struct Channel {
    id: String,
}

#[derive(Serialize)]
struct Message<'a> {
    embeds: [&'a Embed; 1],
}

pub struct DiscordSink {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl DiscordSink {
    pub fn new(config: &DiscordConfig) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                AdapterError::new(SERVICE, format!("Failed to create HTTP client: {}", e))
            })?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
        })
    }

    async fn post<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, AdapterError> {
        let response = self
            .client
            .post(format!("{}{}", self.api_base, path))
            .header("Authorization", format!("Bot {}", self.bot_token))
            .json(body)
            .send()
            .await
            .map_err(|e| AdapterError::new(SERVICE, format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AdapterError::new(
                SERVICE,
                format!("{} returned {}", path, response.status()),
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl NotificationSink for DiscordSink {
    async fn send_dm(&self, target: &str, embed: &Embed) -> Result<(), AdapterError> {
        if self.bot_token.is_empty() {
            return Err(AdapterError::new(SERVICE, "Bot token not configured"));
        }

        let channel: Channel = self
            .post(
                "/users/@me/channels",
                &OpenChannel {
                    recipient_id: target,
                },
            )
            .await?
            .json()
            .await
            .map_err(|e| AdapterError::new(SERVICE, format!("Failed to parse channel: {}", e)))?;

        self.post(
            &format!("/channels/{}/messages", channel.id),
            &Message { embeds: [embed] },
        )
        .await?;
        Ok(())
    }
}
