//! Workflow definition row.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::AppError;
use crate::workflow::{Step, WorkflowDefinition};

#[derive(Debug, Clone, FromRow)]
pub struct DefinitionRow {
    pub id: Uuid,
    pub name: String,
    pub trigger_type: String,
    pub trigger_config: Option<serde_json::Value>,
    pub steps: serde_json::Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DefinitionRow> for WorkflowDefinition {
    type Error = AppError;

    fn try_from(row: DefinitionRow) -> Result<Self, Self::Error> {
        let steps: Vec<Step> = serde_json::from_value(row.steps)?;
        Ok(WorkflowDefinition {
            id: row.id,
            name: row.name,
            trigger_type: row.trigger_type.parse()?,
            trigger_config: row.trigger_config.unwrap_or(serde_json::Value::Null),
            steps,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::TriggerType;
    use serde_json::json;

    #[test]
    fn test_row_into_definition() {
        let row = DefinitionRow {
            id: Uuid::new_v4(),
            name: "Welcome".to_string(),
            trigger_type: "new_entity".to_string(),
            trigger_config: Some(json!({"source": "website"})),
            steps: json!([{"id": "a", "type": "wait", "config": {"duration": 1}, "order": 0}]),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let def = WorkflowDefinition::try_from(row).unwrap();
        assert_eq!(def.trigger_type, TriggerType::NewEntity);
        assert_eq!(def.steps.len(), 1);
    }

    #[test]
    fn test_unknown_trigger_type_rejected() {
        let row = DefinitionRow {
            id: Uuid::new_v4(),
            name: "Bad".to_string(),
            trigger_type: "cron".to_string(),
            trigger_config: None,
            steps: json!([]),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(WorkflowDefinition::try_from(row).is_err());
    }
}
