//! Workflow definition API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::services::DefinitionService;
use crate::workflow::WorkflowDefinition;

/// Request for toggling a definition.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetActiveRequest {
    pub is_active: bool,
}

/// Create or replace a definition.
///
/// POST /api/workflows
pub async fn save(
    State(service): State<DefinitionService>,
    Json(definition): Json<WorkflowDefinition>,
) -> Result<(StatusCode, Json<WorkflowDefinition>), AppError> {
    let saved = service.save(definition).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

/// List definitions.
///
/// GET /api/workflows
pub async fn list(
    State(service): State<DefinitionService>,
) -> Result<Json<Vec<WorkflowDefinition>>, AppError> {
    Ok(Json(service.list().await?))
}

/// Get a definition.
///
/// GET /api/workflows/{id}
pub async fn get(
    State(service): State<DefinitionService>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkflowDefinition>, AppError> {
    Ok(Json(service.get(id).await?))
}

/// Activate or deactivate a definition.
///
/// POST /api/workflows/{id}/active
pub async fn set_active(
    State(service): State<DefinitionService>,
    Path(id): Path<Uuid>,
    Json(request): Json<SetActiveRequest>,
) -> Result<Json<WorkflowDefinition>, AppError> {
    Ok(Json(service.set_active(id, request.is_active).await?))
}
