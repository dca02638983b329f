//! Trigger entry points.
//!
//! The host CRM posts domain events here; every matching active definition
//! starts a run.

use axum::{extract::State, Json};

use crate::error::AppError;
use crate::services::{
    InboundMessageEvent, NewEntityEvent, StageChangeEvent, TriggerEvaluator, TriggerOutcome,
};

/// POST /api/triggers/stage-change
pub async fn stage_change(
    State(evaluator): State<TriggerEvaluator>,
    Json(event): Json<StageChangeEvent>,
) -> Result<Json<TriggerOutcome>, AppError> {
    Ok(Json(evaluator.on_stage_change(event).await?))
}

/// POST /api/triggers/new-entity
pub async fn new_entity(
    State(evaluator): State<TriggerEvaluator>,
    Json(event): Json<NewEntityEvent>,
) -> Result<Json<TriggerOutcome>, AppError> {
    Ok(Json(evaluator.on_new_entity(event).await?))
}

/// POST /api/triggers/inbound-message
pub async fn inbound_message(
    State(evaluator): State<TriggerEvaluator>,
    Json(event): Json<InboundMessageEvent>,
) -> Result<Json<TriggerOutcome>, AppError> {
    Ok(Json(evaluator.on_inbound_message(event).await?))
}
