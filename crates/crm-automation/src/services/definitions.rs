//! Workflow definition management.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::DefinitionStore;
use crate::workflow::parser::{load_definitions_file, validate_definition};
use crate::workflow::WorkflowDefinition;

/// Service for definition operations.
#[derive(Clone)]
pub struct DefinitionService {
    definitions: Arc<dyn DefinitionStore>,
}

impl DefinitionService {
    pub fn new(definitions: Arc<dyn DefinitionStore>) -> Self {
        Self { definitions }
    }

    /// Validate and upsert. `created_at` of an existing definition is kept.
    pub async fn save(&self, mut definition: WorkflowDefinition) -> AppResult<WorkflowDefinition> {
        validate_definition(&definition)?;

        let now = Utc::now();
        match self.definitions.get_definition(definition.id).await? {
            Some(existing) => definition.created_at = existing.created_at,
            None => definition.created_at = now,
        }
        definition.updated_at = now;

        self.definitions.save_definition(&definition).await?;
        tracing::info!(
            workflow_id = %definition.id,
            name = %definition.name,
            trigger_type = %definition.trigger_type,
            steps = definition.steps.len(),
            "Workflow definition saved"
        );
        Ok(definition)
    }

    pub async fn get(&self, id: Uuid) -> AppResult<WorkflowDefinition> {
        self.definitions
            .get_definition(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Workflow '{}' not found", id)))
    }

    pub async fn list(&self) -> AppResult<Vec<WorkflowDefinition>> {
        self.definitions.list_definitions().await
    }

    pub async fn set_active(&self, id: Uuid, active: bool) -> AppResult<WorkflowDefinition> {
        let mut definition = self.get(id).await?;
        definition.is_active = active;
        definition.updated_at = Utc::now();
        self.definitions.save_definition(&definition).await?;
        tracing::info!(workflow_id = %id, active, "Workflow activation changed");
        Ok(definition)
    }

    /// Load, validate and save every definition in a YAML or JSON file.
    pub async fn load_file(&self, path: &Path) -> AppResult<Vec<WorkflowDefinition>> {
        let mut saved = Vec::new();
        for definition in load_definitions_file(path)? {
            saved.push(self.save(definition).await?);
        }
        tracing::info!(path = %path.display(), count = saved.len(), "Workflow definitions loaded");
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::workflow::{Step, StepType, TriggerType};
    use serde_json::json;

    fn definition(steps: Vec<Step>) -> WorkflowDefinition {
        WorkflowDefinition {
            id: Uuid::new_v4(),
            name: "Welcome".to_string(),
            trigger_type: TriggerType::Manual,
            trigger_config: serde_json::Value::Null,
            steps,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_save_rejects_invalid_step_config() {
        let service = DefinitionService::new(Arc::new(MemoryStore::new()));
        let def = definition(vec![Step {
            id: "a".to_string(),
            step_type: StepType::SendEmail,
            config: json!({"subject": "Hi"}),
            order: 0,
        }]);

        let err = service.save(def).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(service.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_keeps_created_at_and_toggles_active() {
        let service = DefinitionService::new(Arc::new(MemoryStore::new()));
        let def = definition(vec![]);
        let saved = service.save(def.clone()).await.unwrap();
        let saved_again = service.save(def).await.unwrap();
        assert_eq!(saved.created_at, saved_again.created_at);

        let off = service.set_active(saved.id, false).await.unwrap();
        assert!(!off.is_active);
        assert!(!service.get(saved.id).await.unwrap().is_active);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let service = DefinitionService::new(Arc::new(MemoryStore::new()));
        let err = service.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
