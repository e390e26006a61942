//! Swap Error Types
//!
//! A closed set of tagged error kinds. Every external-call failure is
//! captured into one of these, logged with structured fields and written to
//! the matching `*_error` column; nothing is returned to the webhook caller.

use thiserror::Error;

use super::state::SwapStatus;

/// Which half of the compensation sequence failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompensationStage {
    /// Returning the withdrawn amount to the application vault
    DepositBack,
    /// Crediting the user's custodial balance from the vault
    TransferBack,
}

impl CompensationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompensationStage::DepositBack => "deposit_back",
            CompensationStage::TransferBack => "transfer_back",
        }
    }
}

impl std::fmt::Display for CompensationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by an external collaborator.
///
/// `reference` carries any external id produced before the failure, e.g. a
/// deposit tx hash that was broadcast but not confirmed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{service}: {message}")]
pub struct AdapterError {
    pub service: &'static str,
    pub message: String,
    pub reference: Option<String>,
}

impl AdapterError {
    pub fn new(service: &'static str, message: impl Into<String>) -> Self {
        Self {
            service,
            message: message.into(),
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// Request store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Swap request not found: {0}")]
    NotFound(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Saga failure taxonomy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwapError {
    #[error("Withdraw failed for {request_code}: {source}")]
    WithdrawFailed {
        request_code: String,
        source: AdapterError,
    },

    #[error("Swap failed for {request_code}: {source}")]
    SwapFailed {
        request_code: String,
        source: AdapterError,
    },

    #[error("Compensation failed at {stage} for {request_code}: {source}")]
    CompensationFailed {
        request_code: String,
        stage: CompensationStage,
        source: AdapterError,
    },

    #[error("Notification failed for {request_code}: {message}")]
    NotificationFailed {
        request_code: String,
        message: String,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid status transition for {request_code}: {from} -> {to}")]
    InvalidTransition {
        request_code: String,
        from: SwapStatus,
        to: SwapStatus,
    },
}

impl SwapError {
    /// Stable code for logs and API payloads
    pub fn code(&self) -> &'static str {
        match self {
            SwapError::WithdrawFailed { .. } => "WITHDRAW_FAILED",
            SwapError::SwapFailed { .. } => "SWAP_FAILED",
            SwapError::CompensationFailed {
                stage: CompensationStage::DepositBack,
                ..
            } => "DEPOSIT_BACK_FAILED",
            SwapError::CompensationFailed {
                stage: CompensationStage::TransferBack,
                ..
            } => "TRANSFER_BACK_FAILED",
            SwapError::NotificationFailed { .. } => "NOTIFICATION_FAILED",
            SwapError::Store(_) => "STORE_ERROR",
            SwapError::InvalidTransition { .. } => "INVALID_TRANSITION",
        }
    }

    /// Funds may be outside both the vault and the user's balance
    pub fn needs_operator(&self) -> bool {
        matches!(self, SwapError::CompensationFailed { .. })
    }
}

/// Why the gate refused an inbound event. None of these create a record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("Upstream status is {0:?}, not approved")]
    StatusNotApproved(String),

    #[error("Request {0} already exists")]
    Duplicate(String),

    #[error("Profile {profile_id} reached {limit} swap requests today")]
    RateLimited { profile_id: String, limit: u64 },

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::StatusNotApproved(_) => "STATUS_NOT_APPROVED",
            Rejection::Duplicate(_) => "DUPLICATE_REQUEST",
            Rejection::RateLimited { .. } => "RATE_LIMITED",
            Rejection::InvalidEvent(_) => "INVALID_EVENT",
            Rejection::Store(_) => "STORE_ERROR",
        }
    }
}

/// Why a reconciliation pass did not run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("Another reconciliation pass is running")]
    Busy,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ReconcileError {
    pub fn code(&self) -> &'static str {
        match self {
            ReconcileError::Busy => "RECONCILE_BUSY",
            ReconcileError::Store(_) => "STORE_ERROR",
        }
    }
}

/// Worker pool admission errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Swap queue is full")]
    QueueFull,

    #[error("Request {0} is already queued or running")]
    AlreadyInFlight(String),

    #[error("Swap dispatcher is shut down")]
    Closed,
}
