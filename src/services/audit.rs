// src/services/audit.rs

use serde_json::Value;
use sqlx::PgPool;

use crate::error::AppError;

/// Records a sensitive action in the audit trail and mirrors it to the log.
pub async fn log_action(
    pool: &PgPool,
    user_id: i64,
    action: &str,
    details: Value,
) -> Result<(), AppError> {
    sqlx::query("INSERT INTO audit_logs (user_id, action, details) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(action)
        .bind(&details)
        .execute(pool)
        .await?;

    tracing::info!(user_id, action, %details, "audit");

    Ok(())
}
