//! PostgreSQL implementation of the durable storage ports.
//!
//! Definitions, runs and the audit trail live in Postgres. CRM entities
//! (contacts, deals, conversations) belong to the host application and are
//! wired separately.

use async_trait::async_trait;
use uuid::Uuid;

use crate::db::models::{AuditRow, DefinitionRow, RunRow};
use crate::db::{queries, DbPool};
use crate::error::{AppError, AppResult};
use crate::store::{AuditEntry, AuditLog, DefinitionStore, RunFilter, RunStore};
use crate::workflow::{ContextType, TriggerType, WorkflowDefinition, WorkflowRun};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl TryFrom<&WorkflowDefinition> for DefinitionRow {
    type Error = AppError;

    fn try_from(def: &WorkflowDefinition) -> Result<Self, Self::Error> {
        Ok(DefinitionRow {
            id: def.id,
            name: def.name.clone(),
            trigger_type: def.trigger_type.as_str().to_string(),
            trigger_config: (!def.trigger_config.is_null()).then(|| def.trigger_config.clone()),
            steps: serde_json::to_value(&def.steps)?,
            is_active: def.is_active,
            created_at: def.created_at,
            updated_at: def.updated_at,
        })
    }
}

impl From<&WorkflowRun> for RunRow {
    fn from(run: &WorkflowRun) -> Self {
        RunRow {
            id: run.id,
            workflow_id: run.workflow_id,
            context_type: run.context_type.as_str().to_string(),
            context_id: run.context_id.clone(),
            current_step_id: run.current_step_id.clone(),
            status: run.status.as_str().to_string(),
            collected_data: serde_json::Value::Object(run.collected_data.clone()),
            started_at: run.started_at,
            completed_at: run.completed_at,
            completed_by: run.completed_by.map(|c| c.as_str().to_string()),
            next_step_at: run.next_step_at,
        }
    }
}

impl From<&AuditEntry> for AuditRow {
    fn from(entry: &AuditEntry) -> Self {
        AuditRow {
            id: entry.id,
            action: entry.action.clone(),
            entity_type: entry.entity_type.clone(),
            entity_id: entry.entity_id.clone(),
            details: (!entry.details.is_null()).then(|| entry.details.clone()),
            created_at: entry.created_at,
        }
    }
}

#[async_trait]
impl DefinitionStore for PgStore {
    async fn get_definition(&self, id: Uuid) -> AppResult<Option<WorkflowDefinition>> {
        queries::definition::get_definition(&self.pool, id)
            .await?
            .map(WorkflowDefinition::try_from)
            .transpose()
    }

    async fn list_definitions(&self) -> AppResult<Vec<WorkflowDefinition>> {
        queries::definition::list_definitions(&self.pool)
            .await?
            .into_iter()
            .map(WorkflowDefinition::try_from)
            .collect()
    }

    async fn list_active_by_trigger(
        &self,
        trigger_type: TriggerType,
    ) -> AppResult<Vec<WorkflowDefinition>> {
        let rows =
            queries::definition::list_active_by_trigger(&self.pool, trigger_type.as_str())
                .await?;

        // A malformed row must not hide the healthy definitions behind it.
        let mut definitions = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id;
            match WorkflowDefinition::try_from(row) {
                Ok(def) => definitions.push(def),
                Err(e) => {
                    tracing::error!(workflow_id = %id, error = %e, "Skipping unreadable workflow definition")
                }
            }
        }
        Ok(definitions)
    }

    async fn save_definition(&self, definition: &WorkflowDefinition) -> AppResult<()> {
        let row = DefinitionRow::try_from(definition)?;
        queries::definition::upsert_definition(&self.pool, &row).await
    }
}

#[async_trait]
impl RunStore for PgStore {
    async fn get_run(&self, id: Uuid) -> AppResult<Option<WorkflowRun>> {
        queries::run::get_run(&self.pool, id)
            .await?
            .map(WorkflowRun::try_from)
            .transpose()
    }

    async fn find_active_run(
        &self,
        workflow_id: Uuid,
        context_type: ContextType,
        context_id: &str,
    ) -> AppResult<Option<WorkflowRun>> {
        queries::run::find_active_run(&self.pool, workflow_id, context_type.as_str(), context_id)
            .await?
            .map(WorkflowRun::try_from)
            .transpose()
    }

    async fn insert_run(&self, run: &WorkflowRun) -> AppResult<()> {
        queries::run::insert_run(&self.pool, &RunRow::from(run)).await
    }

    async fn update_run(&self, run: &WorkflowRun) -> AppResult<()> {
        let affected = queries::run::update_run(&self.pool, &RunRow::from(run)).await?;
        if affected == 0 {
            return Err(AppError::NotFound(format!("Workflow run {}", run.id)));
        }
        Ok(())
    }

    async fn list_runs(&self, filter: &RunFilter) -> AppResult<Vec<WorkflowRun>> {
        let limit = filter.limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX));
        queries::run::list_runs(
            &self.pool,
            filter.workflow_id,
            filter.status.map(|s| s.as_str()),
            filter.context_type.map(|t| t.as_str()),
            filter.context_id.as_deref(),
            limit,
        )
        .await?
        .into_iter()
        .map(WorkflowRun::try_from)
        .collect()
    }
}

#[async_trait]
impl AuditLog for PgStore {
    async fn record(&self, entry: &AuditEntry) -> AppResult<()> {
        queries::audit::insert_audit(&self.pool, &AuditRow::from(entry)).await
    }
}
