//! HTTP handlers for the automation API.
//!
//! This module contains all route handlers organized by domain, and the
//! router that wires them.

pub mod health;
pub mod runs;
pub mod triggers;
pub mod workflows;

use axum::{
    body::Bytes,
    routing::{get, post},
    Router,
};
use serde::de::DeserializeOwned;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub use health::{api_health, health_check};

/// Build the application router with all routes.
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - allow all origins for development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let health_routes = Router::new()
        .route("/health", get(health_check))
        .route("/api/health", get(api_health))
        .with_state(state.clone());

    let workflow_routes = Router::new()
        .route(
            "/api/workflows",
            post(workflows::save).get(workflows::list),
        )
        .route("/api/workflows/{id}", get(workflows::get))
        .route("/api/workflows/{id}/active", post(workflows::set_active))
        .with_state(state.definitions.clone());

    let run_routes = Router::new()
        .route("/api/runs", post(runs::start).get(runs::list))
        .route("/api/runs/{id}", get(runs::get))
        .route("/api/runs/{id}/pause", post(runs::pause))
        .route("/api/runs/{id}/resume", post(runs::resume))
        .route("/api/runs/{id}/cancel", post(runs::cancel))
        .route("/api/runs/{id}/advance", post(runs::advance))
        .with_state(state.runs.clone());

    let trigger_routes = Router::new()
        .route("/api/triggers/stage-change", post(triggers::stage_change))
        .route("/api/triggers/new-entity", post(triggers::new_entity))
        .route(
            "/api/triggers/inbound-message",
            post(triggers::inbound_message),
        )
        .with_state(state.triggers);

    Router::new()
        .merge(health_routes)
        .merge(workflow_routes)
        .merge(run_routes)
        .merge(trigger_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

/// Parse a JSON body that may be absent. An empty body yields the default.
pub(crate) fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> AppResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {}", e)))
}
