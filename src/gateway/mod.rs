pub mod handlers;
pub mod openapi;
pub mod state;
pub mod types;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use state::AppState;

/// All gateway routes plus Swagger UI
pub fn build_router(state: Arc<AppState>) -> Router {
    let internal_routes = Router::new().route("/reconcile", post(handlers::reconcile));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/webhooks/mochi/transfer-request",
            post(handlers::receive_transfer_request),
        )
        .route("/api/v1/swap-requests", get(handlers::list_swap_requests))
        .route(
            "/api/v1/swap-requests/{request_code}",
            get(handlers::get_swap_request),
        )
        .nest("/internal/swap", internal_routes)
        .with_state(state)
        // Stateless, added after with_state
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
}

/// Bind and serve until the process stops
pub async fn run_server(host: &str, port: u16, state: Arc<AppState>) -> std::io::Result<()> {
    let app = build_router(state);

    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await.inspect_err(|e| {
        tracing::error!(addr = %addr, error = %e, "Failed to bind gateway");
    })?;

    println!("🚀 Gateway listening on http://{}", addr);
    println!("📥 Webhook: POST /webhooks/mochi/transfer-request");
    println!("📖 API Docs: http://{}/docs", addr);

    axum::serve(listener, app).await
}
