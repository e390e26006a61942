//! Mochi profile lookup: profile id -> linked Discord user id

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::IdentityResolver;
use crate::config::MochiProfileConfig;
use crate::swap::error::AdapterError;

const SERVICE: &str = "mochi-profile";
const DISCORD_PLATFORM: &str = "discord";

#[derive(Deserialize)]
struct ProfilesResponse {
    #[serde(default)]
    data: Vec<Profile>,
}

#[derive(Deserialize)]
struct Profile {
    #[serde(default)]
    associated_accounts: Vec<AssociatedAccount>,
}

#[derive(Deserialize)]
struct AssociatedAccount {
    platform: String,
    #[serde(default)]
    platform_identifier: String,
}

pub struct MochiProfileClient {
    client: reqwest::Client,
    base_url: String,
}

impl MochiProfileClient {
    pub fn new(config: &MochiProfileConfig) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                AdapterError::new(SERVICE, format!("Failed to create HTTP client: {}", e))
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl IdentityResolver for MochiProfileClient {
    async fn resolve(&self, profile_id: &str) -> Result<Option<String>, AdapterError> {
        let url = format!("{}/api/v1/profiles", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("ids", profile_id)])
            .send()
            .await
            .map_err(|e| AdapterError::new(SERVICE, format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AdapterError::new(
                SERVICE,
                format!("Get Mochi profile returned {}", response.status()),
            ));
        }

        let body: ProfilesResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::new(SERVICE, format!("Failed to parse response: {}", e)))?;

        let profile = match body.data.len() {
            0 => return Ok(None),
            1 => &body.data[0],
            _ => return Err(AdapterError::new(SERVICE, "more than 1 profile")),
        };

        let target = profile
            .associated_accounts
            .iter()
            .find(|a| a.platform == DISCORD_PLATFORM && !a.platform_identifier.is_empty())
            .map(|a| a.platform_identifier.clone());
        debug!(profile_id, linked = target.is_some(), "Resolved profile");
        Ok(target)
    }
}
