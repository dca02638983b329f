//! Workflow definition queries.

use uuid::Uuid;

use crate::db::models::DefinitionRow;
use crate::db::DbPool;
use crate::error::AppResult;

const COLUMNS: &str =
    "id, name, trigger_type, trigger_config, steps, is_active, created_at, updated_at";

/// Get a definition by id.
pub async fn get_definition(pool: &DbPool, id: Uuid) -> AppResult<Option<DefinitionRow>> {
    let sql = format!(
        "SELECT {} FROM crmflow.workflow_definition WHERE id = $1",
        COLUMNS
    );
    let row = sqlx::query_as::<_, DefinitionRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// All definitions, oldest first.
pub async fn list_definitions(pool: &DbPool) -> AppResult<Vec<DefinitionRow>> {
    let sql = format!(
        "SELECT {} FROM crmflow.workflow_definition ORDER BY created_at, id",
        COLUMNS
    );
    let rows = sqlx::query_as::<_, DefinitionRow>(&sql)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Active definitions for one trigger type, oldest first.
pub async fn list_active_by_trigger(
    pool: &DbPool,
    trigger_type: &str,
) -> AppResult<Vec<DefinitionRow>> {
    let sql = format!(
        "SELECT {} FROM crmflow.workflow_definition \
         WHERE trigger_type = $1 AND is_active \
         ORDER BY created_at, id",
        COLUMNS
    );
    let rows = sqlx::query_as::<_, DefinitionRow>(&sql)
        .bind(trigger_type)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Insert or replace a definition by id.
pub async fn upsert_definition(pool: &DbPool, row: &DefinitionRow) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO crmflow.workflow_definition (
            id, name, trigger_type, trigger_config, steps, is_active, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (id) DO UPDATE SET
            name = EXCLUDED.name,
            trigger_type = EXCLUDED.trigger_type,
            trigger_config = EXCLUDED.trigger_config,
            steps = EXCLUDED.steps,
            is_active = EXCLUDED.is_active,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(row.id)
    .bind(&row.name)
    .bind(&row.trigger_type)
    .bind(&row.trigger_config)
    .bind(&row.steps)
    .bind(row.is_active)
    .bind(row.created_at)
    .bind(row.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}
