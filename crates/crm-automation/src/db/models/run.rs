//! Workflow run row.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::AppError;
use crate::workflow::WorkflowRun;

#[derive(Debug, Clone, FromRow)]
pub struct RunRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub context_type: String,
    pub context_id: String,
    pub current_step_id: String,
    pub status: String,
    pub collected_data: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<String>,
    pub next_step_at: Option<DateTime<Utc>>,
}

impl TryFrom<RunRow> for WorkflowRun {
    type Error = AppError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        let collected_data = match row.collected_data {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                return Err(AppError::Parse(format!(
                    "run {}: collected_data is not an object: {}",
                    row.id, other
                )))
            }
        };

        Ok(WorkflowRun {
            id: row.id,
            workflow_id: row.workflow_id,
            context_type: row.context_type.parse()?,
            context_id: row.context_id,
            current_step_id: row.current_step_id,
            status: row.status.parse()?,
            collected_data,
            started_at: row.started_at,
            completed_at: row.completed_at,
            completed_by: row.completed_by.map(|s| s.parse()).transpose()?,
            next_step_at: row.next_step_at,
        })
    }
}
