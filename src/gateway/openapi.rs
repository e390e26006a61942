//! OpenAPI / Swagger UI Documentation
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::gateway::types::{HealthResponse, SwapRequestView, WebhookAck};
use crate::swap::{ReconcileSummary, SortOrder, TransactionRequestEvent};

/// Shared-secret header for operator routes
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "internal_secret",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "X-Internal-Secret",
                    "Operator secret configured as gateway.internal_secret",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "ICY Swap API",
        version = "0.1.0",
        description = "ICY -> BTC swap settlement: transfer-request webhook, audit and reconciliation endpoints.",
        license(name = "MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::receive_transfer_request,
        crate::gateway::handlers::health_check,
        crate::gateway::handlers::get_swap_request,
        crate::gateway::handlers::list_swap_requests,
        crate::gateway::handlers::reconcile,
    ),
    components(
        schemas(
            TransactionRequestEvent,
            WebhookAck,
            SwapRequestView,
            SortOrder,
            HealthResponse,
            ReconcileSummary,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Webhook", description = "Inbound transfer-request events"),
        (name = "Audit", description = "Swap request lookups"),
        (name = "Operator", description = "Manual reconciliation (internal secret required)"),
        (name = "System", description = "Health checks")
    )
)]
pub struct ApiDoc;
