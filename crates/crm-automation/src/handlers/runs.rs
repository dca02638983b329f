//! Workflow run API handlers.
//!
//! Handles starting, listing, pausing, resuming, cancelling and advancing
//! runs.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::optional_json;
use crate::error::AppError;
use crate::services::{RunController, StartRun};
use crate::store::RunFilter;
use crate::workflow::WorkflowRun;

/// Optional body for cancellation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

/// Optional body for a manual advance.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdvanceRequest {
    pub data: Option<Map<String, Value>>,
}

/// Start a run.
///
/// POST /api/runs
pub async fn start(
    State(controller): State<RunController>,
    Json(request): Json<StartRun>,
) -> Result<(StatusCode, Json<WorkflowRun>), AppError> {
    let run = controller.start(request).await?;
    Ok((StatusCode::CREATED, Json(run)))
}

/// List runs, newest first.
///
/// GET /api/runs?workflowId=&status=&contextType=&contextId=&limit=
pub async fn list(
    State(controller): State<RunController>,
    Query(filter): Query<RunFilter>,
) -> Result<Json<Vec<WorkflowRun>>, AppError> {
    Ok(Json(controller.list(&filter).await?))
}

/// Get a run.
///
/// GET /api/runs/{id}
pub async fn get(
    State(controller): State<RunController>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkflowRun>, AppError> {
    controller
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Workflow run {} not found", id)))
}

/// POST /api/runs/{id}/pause
pub async fn pause(
    State(controller): State<RunController>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkflowRun>, AppError> {
    Ok(Json(controller.pause(id).await?))
}

/// POST /api/runs/{id}/resume
pub async fn resume(
    State(controller): State<RunController>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkflowRun>, AppError> {
    Ok(Json(controller.resume(id).await?))
}

/// Cancel a run. Body `{"reason": "..."}` is optional.
///
/// POST /api/runs/{id}/cancel
pub async fn cancel(
    State(controller): State<RunController>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<WorkflowRun>, AppError> {
    let request: CancelRequest = optional_json(&body)?;
    Ok(Json(controller.cancel(id, request.reason).await?))
}

/// Skip the current step. Body `{"data": {...}}` is optional.
///
/// POST /api/runs/{id}/advance
pub async fn advance(
    State(controller): State<RunController>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<WorkflowRun>, AppError> {
    let request: AdvanceRequest = optional_json(&body)?;
    Ok(Json(controller.advance(id, request.data).await?))
}
