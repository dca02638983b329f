//! Workflow run queries.

use uuid::Uuid;

use crate::db::models::RunRow;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};

const COLUMNS: &str = "id, workflow_id, context_type, context_id, current_step_id, status, \
     collected_data, started_at, completed_at, completed_by, next_step_at";

/// Map the one-active-run index violation to `Conflict`.
fn map_unique(err: sqlx::Error, row: &RunRow) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict(format!(
            "workflow {} already has an active run for {} {}",
            row.workflow_id, row.context_type, row.context_id
        )),
        _ => AppError::Database(err),
    }
}

/// Get a run by id.
pub async fn get_run(pool: &DbPool, id: Uuid) -> AppResult<Option<RunRow>> {
    let sql = format!("SELECT {} FROM crmflow.workflow_run WHERE id = $1", COLUMNS);
    let row = sqlx::query_as::<_, RunRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// The active run for a (workflow, context) pair, if any.
pub async fn find_active_run(
    pool: &DbPool,
    workflow_id: Uuid,
    context_type: &str,
    context_id: &str,
) -> AppResult<Option<RunRow>> {
    let sql = format!(
        "SELECT {} FROM crmflow.workflow_run \
         WHERE workflow_id = $1 AND context_type = $2 AND context_id = $3 \
         AND status = 'active' \
         LIMIT 1",
        COLUMNS
    );
    let row = sqlx::query_as::<_, RunRow>(&sql)
        .bind(workflow_id)
        .bind(context_type)
        .bind(context_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Insert a new run.
pub async fn insert_run(pool: &DbPool, row: &RunRow) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO crmflow.workflow_run (
            id, workflow_id, context_type, context_id, current_step_id, status,
            collected_data, started_at, completed_at, completed_by, next_step_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(row.id)
    .bind(row.workflow_id)
    .bind(&row.context_type)
    .bind(&row.context_id)
    .bind(&row.current_step_id)
    .bind(&row.status)
    .bind(&row.collected_data)
    .bind(row.started_at)
    .bind(row.completed_at)
    .bind(&row.completed_by)
    .bind(row.next_step_at)
    .execute(pool)
    .await
    .map_err(|e| map_unique(e, row))?;
    Ok(())
}

/// Write back the mutable fields of a run. Returns the affected row count.
pub async fn update_run(pool: &DbPool, row: &RunRow) -> AppResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE crmflow.workflow_run SET
            current_step_id = $2,
            status = $3,
            collected_data = $4,
            completed_at = $5,
            completed_by = $6,
            next_step_at = $7
        WHERE id = $1
        "#,
    )
    .bind(row.id)
    .bind(&row.current_step_id)
    .bind(&row.status)
    .bind(&row.collected_data)
    .bind(row.completed_at)
    .bind(&row.completed_by)
    .bind(row.next_step_at)
    .execute(pool)
    .await
    .map_err(|e| map_unique(e, row))?;
    Ok(result.rows_affected())
}

/// List runs, newest first. `None` filters match everything.
pub async fn list_runs(
    pool: &DbPool,
    workflow_id: Option<Uuid>,
    status: Option<&str>,
    context_type: Option<&str>,
    context_id: Option<&str>,
    limit: Option<i64>,
) -> AppResult<Vec<RunRow>> {
    let sql = format!(
        "SELECT {} FROM crmflow.workflow_run \
         WHERE ($1::uuid IS NULL OR workflow_id = $1) \
         AND ($2::text IS NULL OR status = $2) \
         AND ($3::text IS NULL OR context_type = $3) \
         AND ($4::text IS NULL OR context_id = $4) \
         ORDER BY started_at DESC, id \
         LIMIT $5",
        COLUMNS
    );
    let rows = sqlx::query_as::<_, RunRow>(&sql)
        .bind(workflow_id)
        .bind(status)
        .bind(context_type)
        .bind(context_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}
