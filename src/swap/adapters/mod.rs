//! Service Adapters
//!
//! Traits for every external collaborator the saga calls, plus the HTTP
//! clients that implement them. The coordinator only sees the traits.

pub mod discord;
pub mod icy_backend;
pub mod profile;
pub mod vault;

pub use discord::DiscordSink;
pub use icy_backend::IcyBackendClient;
pub use profile::MochiProfileClient;
pub use vault::MochiPayVault;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::AdapterError;
use super::notify::Embed;

/// Custodial vault operations
///
/// Amounts are decimal strings; the doc on each method says which unit.
#[async_trait]
pub trait VaultClient: Send + Sync {
    fn name(&self) -> &'static str;

    /// Withdraw `amount` (base units) of `token_id` out of the vault.
    async fn withdraw(&self, amount: &str, token_id: &str) -> Result<(), AdapterError>;

    /// Move `amount` (base units) of `token_id` back into the application
    /// vault. Returns the deposit reference (tx hash).
    async fn deposit_to_vault(&self, amount: &str, token_id: &str)
    -> Result<String, AdapterError>;

    /// Credit `profile_id` with `amount` (display units) from the vault.
    /// Returns the vault tx id.
    async fn transfer_to_user(
        &self,
        profile_id: &str,
        amount: &str,
        token_id: &str,
        note: &str,
    ) -> Result<String, AdapterError>;
}

/// Current swap parameters published by the swap backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcyInfo {
    /// Satoshi per ICY, decimal string
    pub icy_satoshi_rate: String,
    /// Fee deducted from every swap, in satoshi
    pub min_satoshi_fee: String,
    #[serde(default)]
    pub min_icy_to_swap: String,
    #[serde(default)]
    pub icy_usd_rate: String,
    #[serde(default)]
    pub satoshi_usd_rate: String,
}

/// Payload to be signed for one swap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRequest {
    /// Base units
    pub icy_amount: String,
    pub btc_address: String,
    /// Satoshi
    pub btc_amount: String,
}

/// Signed swap authorization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapSignature {
    pub icy_amount: String,
    pub btc_amount: String,
    pub nonce: String,
    pub deadline: String,
    pub signature: String,
}

/// Swap execution service
#[async_trait]
pub trait SwapExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn icy_info(&self) -> Result<IcyInfo, AdapterError>;

    async fn get_signature(&self, req: &SignatureRequest) -> Result<SwapSignature, AdapterError>;

    /// Submit the signed swap and wait for confirmation. Returns the tx hash.
    async fn swap(
        &self,
        signature: &SwapSignature,
        btc_address: &str,
    ) -> Result<String, AdapterError>;
}

/// On-chain token transfer, used to deposit back into the vault
#[async_trait]
pub trait TokenTransfer: Send + Sync {
    /// Transfer `amount` (base units) to `destination`. Returns the tx hash.
    async fn transfer(&self, amount: &str, destination: &str) -> Result<String, AdapterError>;
}

/// Maps a profile to its direct-message target
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// `Ok(None)` when the profile has no linked chat account
    async fn resolve(&self, profile_id: &str) -> Result<Option<String>, AdapterError>;
}

/// Direct message delivery
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send_dm(&self, target: &str, embed: &Embed) -> Result<(), AdapterError>;
}
