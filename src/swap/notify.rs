//! Outcome notifications
//!
//! Turns a terminal swap request into a direct message. Delivery failures
//! are returned as `SwapError::NotificationFailed` for logging only; they
//! never touch the financial state.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::adapters::{IdentityResolver, NotificationSink};
use super::error::SwapError;
use crate::money::shorten;

pub const COLOR_SUCCESS: u32 = 0x5cd97d;
pub const COLOR_ATTENTION: u32 = 0xf5a623;

/// Chat embed: a title, markdown body and sidebar color
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
}

/// Message composition + delivery
pub struct Notifier {
    resolver: Arc<dyn IdentityResolver>,
    sink: Arc<dyn NotificationSink>,
    explorer_base_url: String,
    token_symbol: String,
}

impl Notifier {
    pub fn new(
        resolver: Arc<dyn IdentityResolver>,
        sink: Arc<dyn NotificationSink>,
        explorer_base_url: impl Into<String>,
        token_symbol: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            sink,
            explorer_base_url: explorer_base_url.into().trim_end_matches('/').to_string(),
            token_symbol: token_symbol.into(),
        }
    }

    pub fn success_embed(&self, tx_hash: &str, amount: &str, satoshi: &str) -> Embed {
        let lines = [
            format!(
                "`TxID.           `[{}]({}/tx/{})",
                shorten(tx_hash),
                self.explorer_base_url,
                tx_hash
            ),
            format!("`Icy Amount.     `**{} {}**", amount, self.token_symbol),
            format!("`Satoshi Amount. `**{} SAT**", satoshi),
        ];
        Embed {
            title: "Successful swap".to_string(),
            description: lines.join("\n"),
            color: COLOR_SUCCESS,
        }
    }

    pub fn revert_embed(&self, vault_tx_id: &str, amount: &str) -> Embed {
        let lines = [
            format!("`TxID.           `{}", vault_tx_id),
            format!("`Icy Amount.     `**{} {}**", amount, self.token_symbol),
        ];
        Embed {
            title: "Successful revert icy".to_string(),
            description: lines.join("\n"),
            color: COLOR_SUCCESS,
        }
    }

    /// Refund attempted but not delivered
    pub fn incomplete_revert_embed(&self, amount: &str) -> Embed {
        let lines = [
            format!("`Icy Amount.     `**{} {}**", amount, self.token_symbol),
            "Your swap did not complete and the refund is pending manual review.".to_string(),
        ];
        Embed {
            title: "Swap not completed".to_string(),
            description: lines.join("\n"),
            color: COLOR_ATTENTION,
        }
    }

    /// Resolve the profile's DM target and deliver `embed`.
    pub async fn notify(
        &self,
        request_code: &str,
        profile_id: &str,
        embed: &Embed,
    ) -> Result<(), SwapError> {
        let failed = |message: String| SwapError::NotificationFailed {
            request_code: request_code.to_string(),
            message,
        };

        let target = self
            .resolver
            .resolve(profile_id)
            .await
            .map_err(|e| failed(e.to_string()))?
            .ok_or_else(|| failed(format!("no chat account linked to profile {}", profile_id)))?;

        if let Err(e) = self.sink.send_dm(&target, embed).await {
            warn!(
                request_code = %request_code,
                profile_id = %profile_id,
                error = %e,
                title = %embed.title,
                "DM delivery failed"
            );
            return Err(failed(e.to_string()));
        }

        info!(request_code = %request_code, title = %embed.title, "DM sent");
        Ok(())
    }
}
