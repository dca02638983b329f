//! Schema bootstrap.
//!
//! Statements are idempotent and run in order on startup.

use crate::db::DbPool;
use crate::error::AppResult;

pub const STATEMENTS: &[&str] = &[
    "CREATE SCHEMA IF NOT EXISTS crmflow",
    r#"
    CREATE TABLE IF NOT EXISTS crmflow.workflow_definition (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        trigger_type TEXT NOT NULL,
        trigger_config JSONB,
        steps JSONB NOT NULL DEFAULT '[]'::jsonb,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS workflow_definition_trigger_idx
        ON crmflow.workflow_definition (trigger_type, is_active)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS crmflow.workflow_run (
        id UUID PRIMARY KEY,
        workflow_id UUID NOT NULL,
        context_type TEXT NOT NULL,
        context_id TEXT NOT NULL,
        current_step_id TEXT NOT NULL,
        status TEXT NOT NULL,
        collected_data JSONB NOT NULL DEFAULT '{}'::jsonb,
        started_at TIMESTAMPTZ NOT NULL,
        completed_at TIMESTAMPTZ,
        completed_by TEXT,
        next_step_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS workflow_run_workflow_idx
        ON crmflow.workflow_run (workflow_id)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS workflow_run_context_idx
        ON crmflow.workflow_run (context_type, context_id)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS workflow_run_status_idx
        ON crmflow.workflow_run (status)
    "#,
    // At most one active run per (workflow, context).
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS workflow_run_one_active_idx
        ON crmflow.workflow_run (workflow_id, context_type, context_id)
        WHERE status = 'active'
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS crmflow.audit_log (
        id UUID PRIMARY KEY,
        action TEXT NOT NULL,
        entity_type TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        details JSONB,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS audit_log_entity_idx
        ON crmflow.audit_log (entity_type, entity_id)
    "#,
];

/// Create the schema, tables and indexes if missing.
pub async fn ensure_schema(pool: &DbPool) -> AppResult<()> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::info!(statements = STATEMENTS.len(), "Database schema ensured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_run_index_is_partial_unique() {
        let index = STATEMENTS
            .iter()
            .find(|s| s.contains("workflow_run_one_active_idx"))
            .unwrap();
        assert!(index.contains("CREATE UNIQUE INDEX"));
        assert!(index.contains("WHERE status = 'active'"));
    }
}
