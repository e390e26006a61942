//! API Response types and error codes
//!
//! - `ApiResponse<T>`: Unified response wrapper
//! - `ApiError` / `ApiResult`: handler error path
//! - `error_codes`: Standard error code constants
//! - Response DTOs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::swap::{SortOrder, StepStatus, SwapRequest, SwapRequestQuery, SwapStatus};

// ============================================================================
// Unified API Response Format
// ============================================================================

/// Unified API response wrapper
///
/// - code: 0 = success, non-zero = error code
/// - msg: short message description
/// - data: actual data (success) or null (error)
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    /// Response code: 0 for success, non-zero for errors
    #[schema(example = 0)]
    pub code: i32,
    /// Response message
    #[schema(example = "ok")]
    pub msg: String,
    /// Response data (only present when code == 0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

/// Handler error: HTTP status plus envelope code
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: i32,
    pub msg: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: i32, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            msg: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error_codes::INVALID_PARAMETER, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, error_codes::AUTH_FAILED, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, error_codes::NOT_FOUND, msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, error_codes::CONFLICT, msg)
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            error_codes::SERVICE_UNAVAILABLE,
            msg,
        )
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            error_codes::INTERNAL_ERROR,
            msg,
        )
    }

    pub fn into_err<T>(self) -> ApiResult<T> {
        Err(self)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ApiResponse::<()>::error(self.code, self.msg)),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(ApiResponse::success(data))))
}

pub fn accepted<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::ACCEPTED, Json(ApiResponse::success(data))))
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

/// Webhook acknowledgement
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub request_code: String,
    #[schema(example = "processing")]
    pub status: String,
}

/// Swap request as exposed by the audit API
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SwapRequestView {
    pub id: uuid::Uuid,
    pub request_code: String,
    pub profile_id: String,
    pub tx_status: String,
    pub tx_id: i64,
    pub btc_address: String,
    pub timestamp: i64,
    #[schema(example = "100")]
    pub amount: String,
    pub token_name: String,
    pub token_id: String,
    /// unset, success or failed
    pub withdraw_status: String,
    pub withdraw_error: Option<String>,
    /// pending, success or failed
    pub swap_request_status: String,
    pub swap_request_error: Option<String>,
    pub tx_swap: Option<String>,
    pub revert_status: String,
    pub revert_error: Option<String>,
    pub tx_deposit: Option<String>,
    /// Derived saga state, e.g. SWAP_OK or REVERT_FAILED
    #[schema(example = "SWAP_OK")]
    pub saga_state: String,
    pub needs_reconciliation: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SwapRequest> for SwapRequestView {
    fn from(r: SwapRequest) -> Self {
        let state = r.saga_state();
        Self {
            id: r.id,
            request_code: r.request_code,
            profile_id: r.profile_id,
            tx_status: r.tx_status,
            tx_id: r.tx_id,
            btc_address: r.btc_address,
            timestamp: r.timestamp,
            amount: r.amount,
            token_name: r.token_name,
            token_id: r.token_id,
            withdraw_status: r.withdraw_status.as_str().to_string(),
            withdraw_error: r.withdraw_error,
            swap_request_status: r.swap_request_status.as_str().to_string(),
            swap_request_error: r.swap_request_error,
            tx_swap: r.tx_swap,
            revert_status: r.revert_status.as_str().to_string(),
            revert_error: r.revert_error,
            tx_deposit: r.tx_deposit,
            saga_state: state.as_str().to_string(),
            needs_reconciliation: state.needs_reconciliation(),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Audit list filter
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListSwapRequestsParams {
    /// pending, success or failed
    pub swap_request_status: Option<String>,
    /// unset, success, failed or reconciling
    pub revert_status: Option<String>,
    /// asc or desc on created_at (default desc)
    pub order: Option<SortOrder>,
}

impl ListSwapRequestsParams {
    pub fn into_query(self) -> Result<SwapRequestQuery, ApiError> {
        let swap_request_status = self
            .swap_request_status
            .filter(|s| !s.is_empty())
            .map(|s| {
                SwapStatus::parse(&s)
                    .ok_or_else(|| ApiError::bad_request(format!("Invalid swap_request_status: {}", s)))
            })
            .transpose()?;

        let revert_status = self
            .revert_status
            .filter(|s| !s.is_empty())
            .map(|s| match s.as_str() {
                "unset" => Ok(StepStatus::Unset),
                other => StepStatus::from_db(Some(other))
                    .filter(|st| st.is_set())
                    .ok_or_else(|| ApiError::bad_request(format!("Invalid revert_status: {}", s))),
            })
            .transpose()?;

        Ok(SwapRequestQuery {
            swap_request_status,
            revert_status,
            order: self.order.unwrap_or_default(),
        })
    }
}

/// Health check response data
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Server timestamp in milliseconds
    #[schema(example = 1703494800000_i64)]
    pub timestamp_ms: i64,
    /// Queued or running swap requests
    pub in_flight: usize,
    /// Free queue slots
    pub queue_capacity: usize,
}

// ============================================================================
// Error Codes
// ============================================================================

/// Standard API error codes
pub mod error_codes {
    pub const SUCCESS: i32 = 0;

    // Client errors (1xxx)
    pub const INVALID_PARAMETER: i32 = 1001;

    // Auth errors (2xxx)
    pub const AUTH_FAILED: i32 = 2002;

    // Resource errors (4xxx)
    pub const NOT_FOUND: i32 = 4004;
    pub const CONFLICT: i32 = 4009;

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const SERVICE_UNAVAILABLE: i32 = 5001;
}
