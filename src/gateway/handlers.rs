//! Gateway handlers: inbound webhook, audit API and operator endpoints

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
};
use tracing::{error, info, warn};

use super::state::AppState;
use super::types::{
    ApiError, ApiResponse, ApiResult, HealthResponse, ListSwapRequestsParams, SwapRequestView,
    WebhookAck, accepted, ok,
};
use crate::swap::{DispatchError, ReconcileError, ReconcileSummary, TransactionRequestEvent};

pub const INTERNAL_SECRET_HEADER: &str = "X-Internal-Secret";

/// Inbound transfer-request webhook
///
/// Events whose upstream status is not approved are acknowledged and
/// dropped before any other check. Approved events are shape-checked and
/// queued. The swap itself runs asynchronously; the caller only learns
/// whether it was accepted.
#[utoipa::path(
    post,
    path = "/webhooks/mochi/transfer-request",
    request_body = TransactionRequestEvent,
    responses(
        (status = 202, description = "Queued, already being processed, or ignored", body = WebhookAck),
        (status = 400, description = "Malformed event"),
        (status = 503, description = "Queue full, redeliver later")
    ),
    tag = "Webhook"
)]
pub async fn receive_transfer_request(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TransactionRequestEvent>, JsonRejection>,
) -> ApiResult<WebhookAck> {
    let Json(event) = payload.map_err(|e| {
        warn!(error = %e.body_text(), "Malformed transfer request");
        ApiError::bad_request(e.body_text())
    })?;

    if !event.is_approved() {
        info!(
            request_code = %event.request_code,
            status = %event.status,
            "Transfer request not approved, ignoring"
        );
        return accepted(WebhookAck {
            request_code: event.request_code,
            status: "ignored".to_string(),
        });
    }

    if let Err(rejection) = state.gate.validate_shape(&event) {
        warn!(request_code = %event.request_code, error = %rejection, "Invalid transfer request");
        return ApiError::bad_request(rejection.to_string()).into_err();
    }

    let request_code = event.request_code.clone();
    match state.dispatcher.submit(event) {
        // The in-flight copy is the one that gets processed
        Ok(()) | Err(DispatchError::AlreadyInFlight(_)) => {
            info!(request_code = %request_code, "Transfer request accepted");
            accepted(WebhookAck {
                request_code,
                status: "processing".to_string(),
            })
        }
        Err(DispatchError::QueueFull) => {
            ApiError::service_unavailable("Swap queue full, retry later").into_err()
        }
        Err(DispatchError::Closed) => {
            error!(request_code = %request_code, "Swap dispatcher closed");
            ApiError::service_unavailable("Swap workers unavailable").into_err()
        }
    }
}

/// Health check endpoint
///
/// - Healthy: 200 OK + {code: 0, data: {...}}
/// - Unhealthy: 503 + {code: 5001, msg: "unavailable"}
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse),
        (status = 503, description = "Store unavailable")
    ),
    tag = "System"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> ApiResult<HealthResponse> {
    if let Err(e) = state.store.health_check().await {
        error!(error = %e, "[HEALTH] Store ping failed");
        return ApiError::service_unavailable("unavailable").into_err();
    }

    ok(HealthResponse {
        timestamp_ms: chrono::Utc::now().timestamp_millis(),
        in_flight: state.dispatcher.in_flight(),
        queue_capacity: state.dispatcher.capacity(),
    })
}

/// Get one swap request with its derived saga state
#[utoipa::path(
    get,
    path = "/api/v1/swap-requests/{request_code}",
    params(("request_code" = String, Path, description = "Upstream request code")),
    responses(
        (status = 200, description = "Swap request", body = SwapRequestView),
        (status = 404, description = "Unknown request code")
    ),
    tag = "Audit"
)]
pub async fn get_swap_request(
    State(state): State<Arc<AppState>>,
    Path(request_code): Path<String>,
) -> ApiResult<SwapRequestView> {
    match state.store.get(&request_code).await {
        Ok(Some(record)) => ok(record.into()),
        Ok(None) => ApiError::not_found(format!("Swap request {} not found", request_code))
            .into_err(),
        Err(e) => {
            error!(request_code = %request_code, error = %e, "Swap request lookup failed");
            ApiError::internal("Store error").into_err()
        }
    }
}

/// List swap requests ordered by creation time
#[utoipa::path(
    get,
    path = "/api/v1/swap-requests",
    params(ListSwapRequestsParams),
    responses(
        (status = 200, description = "Swap requests", body = Vec<SwapRequestView>),
        (status = 400, description = "Invalid filter")
    ),
    tag = "Audit"
)]
pub async fn list_swap_requests(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListSwapRequestsParams>,
) -> ApiResult<Vec<SwapRequestView>> {
    let query = params.into_query()?;
    match state.store.list(&query).await {
        Ok(records) => ok(records.into_iter().map(SwapRequestView::from).collect()),
        Err(e) => {
            error!(error = %e, "Swap request listing failed");
            ApiError::internal("Store error").into_err()
        }
    }
}

/// Replay compensation once for every failed refund
///
/// Operator-triggered only. Requires `X-Internal-Secret`.
#[utoipa::path(
    post,
    path = "/internal/swap/reconcile",
    responses(
        (status = 200, description = "Reconciliation summary", body = ReconcileSummary),
        (status = 403, description = "Missing or invalid X-Internal-Secret"),
        (status = 409, description = "A reconciliation pass is already running")
    ),
    security(("internal_secret" = [])),
    tag = "Operator"
)]
pub async fn reconcile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<ReconcileSummary>>, (StatusCode, Json<ApiResponse<()>>)> {
    let secret = headers
        .get(INTERNAL_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    if !state.is_internal_secret(secret) {
        warn!("Reconcile refused: bad internal secret");
        let err = ApiError::forbidden("Access Denied: Missing or Invalid X-Internal-Secret");
        return Err((err.status, Json(ApiResponse::<()>::error(err.code, err.msg))));
    }

    info!("Manual reconciliation requested");
    match state.reconciler.run_once().await {
        Ok(summary) => Ok(Json(ApiResponse::success(summary))),
        Err(ReconcileError::Busy) => {
            let err = ApiError::conflict("Reconciliation already running, retry later");
            Err((err.status, Json(ApiResponse::<()>::error(err.code, err.msg))))
        }
        Err(e) => {
            error!(error = %e, "Reconciliation scan failed");
            let err = ApiError::internal("Store error");
            Err((err.status, Json(ApiResponse::<()>::error(err.code, err.msg))))
        }
    }
}
