//! Webhook server: health check and form submissions.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::app::Automations;
use crate::forms::FormSubmitEvent;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub automations: Arc<Automations>,
}

/// Build the router.
pub fn routes(automations: Arc<Automations>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/forms/{form_id}/submit", post(submit_form))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { automations })
}

/// Bind `0.0.0.0:port` and serve until the task is dropped.
pub async fn serve(automations: Arc<Automations>, port: u16) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "Webhook server started");
    axum::serve(listener, routes(automations)).await
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "inbox-automations"
    }))
}

async fn submit_form(
    State(state): State<AppState>,
    Path(form_id): Path<String>,
    Json(event): Json<FormSubmitEvent>,
) -> impl IntoResponse {
    match state.automations.submit_form(&form_id, event).await {
        Ok(result) => (StatusCode::OK, Json(serde_json::json!(result))),
        Err(e) => {
            error!(form = %form_id, error = %e, "Form submission failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
        }
    }
}
