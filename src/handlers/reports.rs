// src/handlers/reports.rs
//
// Audit-log queries and CSV report downloads. Rendering to PDF/XLSX is an
// external concern; CSV is the format produced here.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::{PgPool, QueryBuilder};

use crate::error::AppError;

fn csv_response(filename: &str, body: String) -> impl IntoResponse + use<> {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
}

/// Quotes one CSV field, doubling embedded quotes.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub from: Option<chrono::DateTime<chrono::Utc>>,
    pub to: Option<chrono::DateTime<chrono::Utc>>,
    pub user_id: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, sqlx::FromRow, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct AuditLogRow {
    id: i64,
    user_id: i64,
    action: String,
    details: serde_json::Value,
    created_at: chrono::DateTime<chrono::Utc>,
}

/// Queries the audit trail with optional date range and actor filters.
pub async fn audit_logs(
    State(pool): State<PgPool>,
    Query(params): Query<AuditQuery>,
) -> Result<impl IntoResponse, AppError> {
    let mut builder = QueryBuilder::<sqlx::Postgres>::new(
        "SELECT id, user_id, action, details, created_at FROM audit_logs WHERE 1=1",
    );

    if let Some(from) = params.from {
        builder.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = params.to {
        builder.push(" AND created_at <= ").push_bind(to);
    }
    if let Some(user_id) = params.user_id {
        builder.push(" AND user_id = ").push_bind(user_id);
    }

    builder.push(" ORDER BY created_at DESC");
    builder
        .push(" LIMIT ")
        .push_bind(params.limit.unwrap_or(100).clamp(1, 1000));
    builder
        .push(" OFFSET ")
        .push_bind(params.offset.unwrap_or(0).max(0));

    let logs: Vec<AuditLogRow> = builder.build_query_as().fetch_all(&pool).await?;

    Ok(Json(json!({ "data": logs })))
}

/// Administrator activity summary as a CSV download.
pub async fn admin_activity_report(
    State(pool): State<PgPool>,
) -> Result<impl IntoResponse, AppError> {
    let rows: Vec<(i64, String, String, i64, Option<chrono::DateTime<chrono::Utc>>)> =
        sqlx::query_as(
            r#"
            SELECT u.id, u.name, u.email, COUNT(a.id), MAX(a.created_at)
            FROM users u
            LEFT JOIN audit_logs a ON a.user_id = u.id
            WHERE u.role IN ('super_admin', 'admin', 'teacher')
            GROUP BY u.id, u.name, u.email
            ORDER BY u.id
            "#,
        )
        .fetch_all(&pool)
        .await?;

    let mut csv = String::from("id,name,email,actions,lastAction\n");
    for (id, name, email, actions, last_action) in rows {
        csv.push_str(&format!(
            "{},{},{},{},{}\n",
            id,
            csv_field(&name),
            csv_field(&email),
            actions,
            last_action.map(|t| t.to_rfc3339()).unwrap_or_default(),
        ));
    }

    Ok(csv_response("admin_activity.csv", csv))
}

/// Per-answer breakdown of one student's session, as CSV.
pub async fn student_exam_report(
    State(pool): State<PgPool>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let header: Option<(i64, Option<f64>, Option<String>)> = sqlx::query_as(
        "SELECT student_id, total_score, grade FROM exam_sessions WHERE id = $1",
    )
    .bind(session_id)
    .fetch_optional(&pool)
    .await?;

    let (student_id, total_score, grade) =
        header.ok_or(AppError::NotFound("Session not found".to_string()))?;

    let rows: Vec<(i64, String, String, Option<bool>, Option<f64>, f64)> = sqlx::query_as(
        r#"
        SELECT a.question_id, q.content, a.answer, a.is_correct, a.points_awarded, q.points
        FROM answers a
        JOIN questions q ON a.question_id = q.id
        WHERE a.session_id = $1
        ORDER BY a.question_id
        "#,
    )
    .bind(session_id)
    .fetch_all(&pool)
    .await?;

    let mut csv = format!(
        "sessionId,studentId,totalScore,grade\n{},{},{},{}\n\n",
        session_id,
        student_id,
        total_score.map(|s| s.to_string()).unwrap_or_default(),
        grade.unwrap_or_default(),
    );
    csv.push_str("questionId,question,answer,correct,pointsAwarded,pointsPossible\n");
    for (question_id, content, answer, is_correct, awarded, possible) in rows {
        csv.push_str(&format!(
            "{},{},{},{},{},{}\n",
            question_id,
            csv_field(&content),
            csv_field(&answer),
            is_correct.map(|c| c.to_string()).unwrap_or_default(),
            awarded.map(|p| p.to_string()).unwrap_or_default(),
            possible,
        ));
    }

    Ok(csv_response(
        &format!("session_{session_id}_report.csv"),
        csv,
    ))
}

/// Group results for one exam: per-student scores plus distribution summary.
pub async fn group_exam_report(
    State(pool): State<PgPool>,
    Path((exam_id, group_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let rows: Vec<(i64, String, Option<f64>, Option<String>)> = sqlx::query_as(
        r#"
        SELECT u.id, u.name, s.total_score, s.grade
        FROM exam_sessions s
        JOIN users u ON s.student_id = u.id
        JOIN students st ON st.email = u.email
        JOIN group_students gs ON gs.student_id = st.id
        WHERE s.exam_id = $1 AND gs.group_id = $2 AND s.status = 'graded'
        ORDER BY s.total_score DESC NULLS LAST
        "#,
    )
    .bind(exam_id)
    .bind(group_id)
    .fetch_all(&pool)
    .await?;

    if rows.is_empty() {
        return Err(AppError::NotFound(
            "No graded sessions for this exam and group".to_string(),
        ));
    }

    let scores: Vec<f64> = rows.iter().filter_map(|(_, _, s, _)| *s).collect();
    let average = scores.iter().sum::<f64>() / scores.len() as f64;
    let deviation = (scores.iter().map(|s| (s - average).powi(2)).sum::<f64>()
        / scores.len() as f64)
        .sqrt();
    let max = scores.iter().cloned().fold(f64::MIN, f64::max);
    let min = scores.iter().cloned().fold(f64::MAX, f64::min);

    let mut csv = format!(
        "examId,groupId,sessions,average,stddev,max,min\n{},{},{},{},{},{},{}\n\n",
        exam_id,
        group_id,
        rows.len(),
        average,
        deviation,
        max,
        min,
    );
    csv.push_str("studentId,name,totalScore,grade\n");
    for (student_id, name, total_score, grade) in rows {
        csv.push_str(&format!(
            "{},{},{},{}\n",
            student_id,
            csv_field(&name),
            total_score.map(|s| s.to_string()).unwrap_or_default(),
            grade.unwrap_or_default(),
        ));
    }

    Ok(csv_response(
        &format!("exam_{exam_id}_group_{group_id}_report.csv"),
        csv,
    ))
}

#[cfg(test)]
mod tests {
    use super::csv_field;

    #[test]
    fn plain_fields_pass_through() {
        assert_eq!(csv_field("algebra"), "algebra");
    }

    #[test]
    fn fields_with_separators_are_quoted() {
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("line\nbreak"), "\"line\nbreak\"");
    }

    #[test]
    fn embedded_quotes_are_doubled() {
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
