//! MochiPay vault client
//!
//! Every call is authenticated with an ed25519 signature over the current
//! unix time, sent as `X-Message` / `X-Signature` / `X-Application`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{TokenTransfer, VaultClient};
use crate::config::MochiPayConfig;
use crate::swap::error::AdapterError;

const SERVICE: &str = "mochi-pay";
const PLATFORM: &str = "discord";
const DEPOSIT_TOKEN: &str = "ICY";

#[derive(Serialize)]
struct WithdrawRequest<'a> {
    address: &'a str,
    amount: &'a str,
    platform: &'a str,
    token_id: &'a str,
    vault_id: &'a str,
}

#[derive(Serialize)]
struct DepositRequest<'a> {
    platform: &'a str,
    token: &'a str,
    vault_id: &'a str,
}

#[derive(Deserialize)]
struct DepositResponse {
    #[serde(default)]
    data: Vec<DepositAddress>,
}

#[derive(Deserialize)]
struct DepositAddress {
    #[serde(default)]
    token: Option<DepositToken>,
    contract: DepositContract,
}

#[derive(Deserialize)]
struct DepositToken {
    id: String,
}

#[derive(Deserialize)]
struct DepositContract {
    address: String,
}

#[derive(Serialize)]
struct TransferRequest<'a> {
    recipient_ids: [&'a str; 1],
    amounts: [&'a str; 1],
    token_id: &'a str,
    vault_id: &'a str,
    description: &'a str,
}

#[derive(Deserialize)]
struct TransferResponse {
    #[serde(default)]
    data: Vec<VaultTransaction>,
}

#[derive(Deserialize)]
struct VaultTransaction {
    tx_id: i64,
}

/// Parse a hex ed25519 key: a 32-byte seed or a 64-byte seed||public pair.
pub fn parse_signing_key(hex_key: &str) -> Result<SigningKey, AdapterError> {
    let bytes = hex::decode(hex_key.trim().trim_start_matches("0x"))
        .map_err(|e| AdapterError::new(SERVICE, format!("Invalid application key hex: {}", e)))?;

    match bytes.len() {
        32 => {
            let mut seed = [0u8; 32];
            seed.copy_from_slice(&bytes);
            Ok(SigningKey::from_bytes(&seed))
        }
        64 => {
            let mut pair = [0u8; 64];
            pair.copy_from_slice(&bytes);
            SigningKey::from_keypair_bytes(&pair).map_err(|e| {
                AdapterError::new(SERVICE, format!("Invalid application keypair: {}", e))
            })
        }
        n => Err(AdapterError::new(
            SERVICE,
            format!("Application key must be 32 or 64 bytes, got {}", n),
        )),
    }
}

pub struct MochiPayVault {
    client: reqwest::Client,
    config: MochiPayConfig,
    signing_key: SigningKey,
    /// Sends ICY on-chain to the vault's deposit contract
    transfer: Arc<dyn TokenTransfer>,
}

impl MochiPayVault {
    pub fn new(
        config: MochiPayConfig,
        transfer: Arc<dyn TokenTransfer>,
    ) -> Result<Self, AdapterError> {
        let signing_key = parse_signing_key(&config.application_private_key)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                AdapterError::new(SERVICE, format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            config,
            signing_key,
            transfer,
        })
    }

    fn application_url(&self, owner_id: &str, action: &str) -> String {
        format!(
            "{}/api/v1/profiles/{}/applications/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            owner_id,
            self.config.application_id,
            action
        )
    }

    /// Signed POST. Anything but 200 is a failure.
    async fn signed_post<T: Serialize>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<reqwest::Response, AdapterError> {
        let message = chrono::Utc::now().timestamp().to_string();
        let signature = self.signing_key.sign(message.as_bytes());

        let response = self
            .client
            .post(url)
            .header("X-Message", &message)
            .header("X-Signature", hex::encode(signature.to_bytes()))
            .header("X-Application", &self.config.application_name)
            .json(body)
            .send()
            .await
            .map_err(|e| AdapterError::new(SERVICE, format!("HTTP request failed: {}", e)))?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(AdapterError::new(
                SERVICE,
                format!("invalid call, code {}", response.status().as_u16()),
            ));
        }
        Ok(response)
    }

    /// Deposit contract address of the application vault for `token_id`
    async fn deposit_address(&self, token_id: &str) -> Result<String, AdapterError> {
        let url = self.application_url(&self.config.application_owner_id, "deposit");
        let body = DepositRequest {
            platform: PLATFORM,
            token: DEPOSIT_TOKEN,
            vault_id: &self.config.application_vault_id,
        };
        let response: DepositResponse = self
            .signed_post(&url, &body)
            .await?
            .json()
            .await
            .map_err(|e| AdapterError::new(SERVICE, format!("Failed to parse response: {}", e)))?;

        response
            .data
            .into_iter()
            .find(|d| d.token.as_ref().is_some_and(|t| t.id == token_id))
            .map(|d| d.contract.address)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| AdapterError::new(SERVICE, "not found application evm address"))
    }
}

#[async_trait]
impl VaultClient for MochiPayVault {
    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn withdraw(&self, amount: &str, token_id: &str) -> Result<(), AdapterError> {
        let url = self.application_url(&self.config.application_owner_id, "withdraw");
        let body = WithdrawRequest {
            address: &self.config.icy_pool_public_key,
            amount,
            platform: PLATFORM,
            token_id,
            vault_id: &self.config.application_vault_id,
        };
        self.signed_post(&url, &body).await?;
        debug!(amount, token_id, "Vault withdraw accepted");
        Ok(())
    }

    async fn deposit_to_vault(
        &self,
        amount: &str,
        token_id: &str,
    ) -> Result<String, AdapterError> {
        let destination = self.deposit_address(token_id).await?;
        info!(amount, token_id, destination = %destination, "Depositing back to vault");
        self.transfer.transfer(amount, &destination).await
    }

    async fn transfer_to_user(
        &self,
        profile_id: &str,
        amount: &str,
        token_id: &str,
        note: &str,
    ) -> Result<String, AdapterError> {
        let url = self.application_url(profile_id, "transfer");
        let body = TransferRequest {
            recipient_ids: [profile_id],
            amounts: [amount],
            token_id,
            vault_id: &self.config.application_vault_id,
            description: note,
        };
        let response: TransferResponse = self
            .signed_post(&url, &body)
            .await?
            .json()
            .await
            .map_err(|e| AdapterError::new(SERVICE, format!("Failed to parse response: {}", e)))?;

        response
            .data
            .first()
            .map(|tx| tx.tx_id.to_string())
            .ok_or_else(|| AdapterError::new(SERVICE, "Transfer returned no transaction"))
    }
}
