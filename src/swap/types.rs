//! Swap Request Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::error::SwapError;
use super::state::{SagaState, StepStatus, SwapStatus};

/// Upstream status value that marks an approved transfer
pub const APPROVED_STATUS: &str = "success";

/// Note attached to every vault transfer-back
pub const REVERT_NOTE: &str = "Revert icy to user";

/// Inbound transfer-request event.
///
/// `description` carries the BTC destination address.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct TransactionRequestEvent {
    #[validate(length(min = 1, message = "profile_id is required"))]
    #[schema(example = "1710000000000000001")]
    pub profile_id: String,
    #[validate(length(min = 1, message = "request_code is required"))]
    #[schema(example = "6a5e0f0e-7f0b-4a1e-9a55-0b1d8c1d6f3a")]
    pub request_code: String,
    #[schema(example = "success")]
    pub status: String,
    #[serde(default)]
    pub tx_id: i64,
    #[serde(default)]
    #[schema(example = "bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh")]
    pub description: String,
    #[serde(default)]
    pub timestamp: i64,
    #[validate(length(min = 1, message = "amount is required"))]
    #[schema(example = "100")]
    pub amount: String,
    #[serde(default)]
    #[schema(example = "ICY")]
    pub token_name: String,
    #[validate(length(min = 1, message = "token_id is required"))]
    pub token_id: String,
}

impl TransactionRequestEvent {
    pub fn is_approved(&self) -> bool {
        self.status == APPROVED_STATUS
    }

    pub fn btc_address(&self) -> &str {
        &self.description
    }
}

/// One row per swap attempt, keyed by `request_code`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRequest {
    pub id: Uuid,
    pub profile_id: String,
    pub request_code: String,
    pub tx_status: String,
    pub tx_id: i64,
    pub btc_address: String,
    pub timestamp: i64,
    /// Display amount exactly as delivered by the event
    pub amount: String,
    pub token_name: String,
    pub token_id: String,
    pub withdraw_status: StepStatus,
    pub withdraw_error: Option<String>,
    pub swap_request_status: SwapStatus,
    pub swap_request_error: Option<String>,
    pub tx_swap: Option<String>,
    pub revert_status: StepStatus,
    pub revert_error: Option<String>,
    pub tx_deposit: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SwapRequest {
    /// Fresh pending record for an admitted event
    pub fn from_event(event: &TransactionRequestEvent) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            profile_id: event.profile_id.clone(),
            request_code: event.request_code.clone(),
            tx_status: event.status.clone(),
            tx_id: event.tx_id,
            btc_address: event.description.clone(),
            timestamp: event.timestamp,
            amount: event.amount.clone(),
            token_name: event.token_name.clone(),
            token_id: event.token_id.clone(),
            withdraw_status: StepStatus::Unset,
            withdraw_error: None,
            swap_request_status: SwapStatus::Pending,
            swap_request_error: None,
            tx_swap: None,
            revert_status: StepStatus::Unset,
            revert_error: None,
            tx_deposit: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn saga_state(&self) -> SagaState {
        SagaState::derive(
            self.withdraw_status,
            self.swap_request_status,
            self.revert_status,
            self.tx_deposit.is_some(),
        )
    }

    fn set_swap_status(&mut self, next: SwapStatus) -> Result<(), SwapError> {
        if !self.swap_request_status.can_transition_to(next) {
            return Err(SwapError::InvalidTransition {
                request_code: self.request_code.clone(),
                from: self.swap_request_status,
                to: next,
            });
        }
        self.swap_request_status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn mark_withdraw_success(&mut self) {
        self.withdraw_status = StepStatus::Success;
        self.updated_at = Utc::now();
    }

    /// Withdraw failure also fails the swap as a whole
    pub fn mark_withdraw_failed(&mut self, error: &str) -> Result<(), SwapError> {
        self.set_swap_status(SwapStatus::Failed)?;
        self.withdraw_status = StepStatus::Failed;
        self.withdraw_error = Some(error.to_string());
        self.swap_request_error = Some(error.to_string());
        Ok(())
    }

    pub fn mark_swap_success(&mut self, tx_hash: &str) -> Result<(), SwapError> {
        self.set_swap_status(SwapStatus::Success)?;
        self.tx_swap = Some(tx_hash.to_string());
        Ok(())
    }

    pub fn mark_swap_failed(&mut self, error: &str) -> Result<(), SwapError> {
        self.set_swap_status(SwapStatus::Failed)?;
        self.swap_request_error = Some(error.to_string());
        Ok(())
    }

    pub fn mark_revert_success(&mut self) {
        self.revert_status = StepStatus::Success;
        self.revert_error = None;
        self.updated_at = Utc::now();
    }

    pub fn mark_revert_failed(&mut self, error: &str) {
        self.revert_status = StepStatus::Failed;
        self.revert_error = Some(error.to_string());
        self.updated_at = Utc::now();
    }

    /// Empty references are not recorded
    pub fn set_tx_deposit(&mut self, reference: Option<&str>) {
        if let Some(r) = reference.filter(|r| !r.is_empty()) {
            self.tx_deposit = Some(r.to_string());
        }
    }
}

/// Sort direction on `created_at`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Filter for listing swap requests
#[derive(Debug, Clone, Default)]
pub struct SwapRequestQuery {
    pub swap_request_status: Option<SwapStatus>,
    pub revert_status: Option<StepStatus>,
    pub order: SortOrder,
}

impl SwapRequestQuery {
    /// Rows whose refund failed and may be replayed by an operator
    pub fn revert_failed() -> Self {
        Self {
            swap_request_status: None,
            revert_status: Some(StepStatus::Failed),
            order: SortOrder::Asc,
        }
    }

    pub fn matches(&self, record: &SwapRequest) -> bool {
        self.swap_request_status
            .is_none_or(|s| s == record.swap_request_status)
            && self.revert_status.is_none_or(|s| s == record.revert_status)
    }
}

/// Approved event used across unit tests
#[cfg(test)]
pub(crate) fn sample_event(request_code: &str) -> TransactionRequestEvent {
    TransactionRequestEvent {
        profile_id: "p-1".into(),
        request_code: request_code.into(),
        status: APPROVED_STATUS.into(),
        tx_id: 7,
        description: "bc1qtestaddress".into(),
        timestamp: 1_700_000_000,
        amount: "100".into(),
        token_name: "ICY".into(),
        token_id: "icy-token".into(),
    }
}
