//! Audit log queries.

use crate::db::models::AuditRow;
use crate::db::DbPool;
use crate::error::AppResult;

/// Append an audit entry.
pub async fn insert_audit(pool: &DbPool, row: &AuditRow) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO crmflow.audit_log (id, action, entity_type, entity_id, details, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(row.id)
    .bind(&row.action)
    .bind(&row.entity_type)
    .bind(&row.entity_id)
    .bind(&row.details)
    .bind(row.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

