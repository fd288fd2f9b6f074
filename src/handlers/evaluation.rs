// src/handlers/evaluation.rs
//
// Score retrieval, manual review of open-ended answers, grade appeals, the
// curve adjustment and per-exam analytics. Banding and curve math are pure
// functions so they can be unit tested without a database.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use std::str::FromStr;

use crate::{
    error::AppError,
    models::session::Answer,
    permissions::Role,
    services::{audit, notifier::Notification},
    state::AppState,
    utils::jwt::Claims,
};

/// Fixed banding over a 0-100 score. Scores are compared unrounded, so
/// 89.999 is a B.
pub fn letter_grade(score: f64) -> &'static str {
    if score >= 90.0 {
        "A"
    } else if score >= 80.0 {
        "B"
    } else if score >= 70.0 {
        "C"
    } else if score >= 60.0 {
        "D"
    } else {
        "F"
    }
}

pub fn performance_label(score: f64) -> &'static str {
    if score >= 90.0 {
        "Excelente"
    } else if score >= 70.0 {
        "Bueno"
    } else if score >= 60.0 {
        "Regular"
    } else {
        "Deficiente"
    }
}

const CURVE_TARGET_MEAN: f64 = 70.0;
const CURVE_TARGET_STDDEV: f64 = 10.0;

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn stddev(values: &[f64], mean: f64) -> f64 {
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Linearly rescales scores to the target mean/deviation, clamped to [0, 100].
/// A degenerate distribution (every score equal) is shifted to the mean only.
pub fn gaussian_adjust(scores: &[f64]) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }

    let current_mean = mean(scores);
    let current_stddev = stddev(scores, current_mean);

    scores
        .iter()
        .map(|&score| {
            let adjusted = if current_stddev > 0.0 {
                CURVE_TARGET_MEAN
                    + (score - current_mean) / current_stddev * CURVE_TARGET_STDDEV
            } else {
                CURVE_TARGET_MEAN
            };
            adjusted.clamp(0.0, 100.0)
        })
        .collect()
}

/// Returns the stored score and grade of a session. Students can only read
/// their own; staff roles can read any.
pub async fn get_score(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let row: Option<(i64, Option<f64>, Option<String>, String)> = sqlx::query_as(
        "SELECT student_id, total_score, grade, status::TEXT FROM exam_sessions WHERE id = $1",
    )
    .bind(session_id)
    .fetch_optional(&pool)
    .await?;

    let (student_id, total_score, grade, status) =
        row.ok_or(AppError::NotFound("Session not found".to_string()))?;

    let role = Role::from_str(&claims.role)
        .map_err(|_| AppError::Forbidden("Role not authorized".to_string()))?;
    if role == Role::Student && student_id != claims.user_id()? {
        return Err(AppError::Forbidden("Not your session".to_string()));
    }

    Ok(Json(json!({
        "sessionId": session_id,
        "status": status,
        "totalScore": total_score,
        "grade": grade,
        "performance": total_score.map(performance_label),
    })))
}

/// Recomputes a session's total and grade from its reviewed answers.
///
/// Only answers holding awarded points count, on both sides of the division:
/// at submit time that is exactly the objective questions, and each manual
/// review folds one more answer in.
pub async fn recompute_session_score(
    pool: &PgPool,
    session_id: i64,
) -> Result<(f64, &'static str), AppError> {
    let (earned, possible): (Option<f64>, Option<f64>) = sqlx::query_as(
        r#"
        SELECT SUM(a.points_awarded), SUM(q.points)
        FROM answers a
        JOIN questions q ON a.question_id = q.id
        WHERE a.session_id = $1 AND a.points_awarded IS NOT NULL
        "#,
    )
    .bind(session_id)
    .fetch_one(pool)
    .await?;

    let possible = possible.unwrap_or(0.0);
    let score = if possible > 0.0 {
        earned.unwrap_or(0.0) / possible * 100.0
    } else {
        0.0
    };
    let grade = letter_grade(score);

    sqlx::query("UPDATE exam_sessions SET total_score = $2, grade = $3 WHERE id = $1")
        .bind(session_id)
        .bind(score)
        .bind(grade)
        .execute(pool)
        .await?;

    Ok((score, grade))
}

/// Lists a session's stored answers for the manual review workflow. Essay
/// rows awaiting review are the ones with `pointsAwarded` still null.
pub async fn list_answers(
    State(pool): State<PgPool>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM exam_sessions WHERE id = $1")
        .bind(session_id)
        .fetch_optional(&pool)
        .await?;
    exists.ok_or(AppError::NotFound("Session not found".to_string()))?;

    let answers: Vec<Answer> = sqlx::query_as(
        r#"
        SELECT id, session_id, question_id, answer, is_correct, points_awarded,
               review_comment, reviewed_by, created_at
        FROM answers
        WHERE session_id = $1
        ORDER BY question_id
        "#,
    )
    .bind(session_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(json!({ "data": answers })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewAnswerRequest {
    pub question_id: i64,
    pub points_awarded: f64,
    #[serde(default)]
    pub comment: String,
}

/// Manual review of an open-ended answer. Awards points, recomputes the
/// session score and grade, notifies the student and audit-logs the override.
pub async fn review_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<i64>,
    Json(payload): Json<ReviewAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.points_awarded < 0.0 {
        return Err(AppError::BadRequest(
            "Awarded points cannot be negative".to_string(),
        ));
    }

    let reviewer_id = claims.user_id()?;

    let result = sqlx::query(
        r#"
        UPDATE answers SET points_awarded = $3, review_comment = $4, reviewed_by = $5,
                           is_correct = ($3 > 0)
        WHERE session_id = $1 AND question_id = $2
        "#,
    )
    .bind(session_id)
    .bind(payload.question_id)
    .bind(payload.points_awarded)
    .bind(&payload.comment)
    .bind(reviewer_id)
    .execute(&state.pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Answer not found".to_string()));
    }

    let (score, grade) = recompute_session_score(&state.pool, session_id).await?;

    let student_id: Option<i64> =
        sqlx::query_scalar("SELECT student_id FROM exam_sessions WHERE id = $1")
            .bind(session_id)
            .fetch_optional(&state.pool)
            .await?;

    if let Some(student_id) = student_id {
        state.notifier.notify_user(
            student_id,
            &Notification::new(
                "answer_reviewed",
                "An answer of yours has been reviewed",
                json!({ "sessionId": session_id, "totalScore": score, "grade": grade }),
            ),
        );
    }

    audit::log_action(
        &state.pool,
        reviewer_id,
        "review_answer",
        json!({
            "sessionId": session_id,
            "questionId": payload.question_id,
            "pointsAwarded": payload.points_awarded,
        }),
    )
    .await?;

    Ok(Json(json!({
        "sessionId": session_id,
        "totalScore": score,
        "grade": grade,
    })))
}

#[derive(Debug, Deserialize)]
pub struct AppealRequest {
    pub reason: String,
}

/// Opens a grade appeal for the caller's session. Created PENDING; resolution
/// happens through manual review.
pub async fn create_appeal(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<i64>,
    Json(payload): Json<AppealRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.reason.trim().is_empty() {
        return Err(AppError::BadRequest("Reason is required".to_string()));
    }

    let student_id = claims.user_id()?;

    let owner: Option<i64> =
        sqlx::query_scalar("SELECT student_id FROM exam_sessions WHERE id = $1 AND status = 'graded'")
            .bind(session_id)
            .fetch_optional(&state.pool)
            .await?;

    let owner = owner.ok_or(AppError::NotFound("Graded session not found".to_string()))?;
    if owner != student_id {
        return Err(AppError::Forbidden("Not your session".to_string()));
    }

    let appeal_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO grade_appeals (session_id, student_id, reason)
        VALUES ($1, $2, $3)
        RETURNING id
        "#,
    )
    .bind(session_id)
    .bind(student_id)
    .bind(payload.reason.trim())
    .fetch_one(&state.pool)
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "appealId": appeal_id, "status": "PENDING" })),
    ))
}

/// Applies the curve over every graded session of an exam and persists the
/// adjusted scores and grades.
pub async fn apply_curve(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let sessions: Vec<(i64, f64)> = sqlx::query_as(
        r#"
        SELECT id, total_score FROM exam_sessions
        WHERE exam_id = $1 AND status = 'graded' AND total_score IS NOT NULL
        ORDER BY id
        "#,
    )
    .bind(exam_id)
    .fetch_all(&state.pool)
    .await?;

    if sessions.is_empty() {
        return Err(AppError::NotFound(
            "No graded sessions for this exam".to_string(),
        ));
    }

    let scores: Vec<f64> = sessions.iter().map(|(_, s)| *s).collect();
    let adjusted = gaussian_adjust(&scores);

    for ((session_id, _), score) in sessions.iter().zip(&adjusted) {
        sqlx::query("UPDATE exam_sessions SET total_score = $2, grade = $3 WHERE id = $1")
            .bind(session_id)
            .bind(score)
            .bind(letter_grade(*score))
            .execute(&state.pool)
            .await?;
    }

    audit::log_action(
        &state.pool,
        claims.user_id()?,
        "apply_curve",
        json!({ "examId": exam_id, "sessions": sessions.len() }),
    )
    .await?;

    Ok(Json(json!({
        "examId": exam_id,
        "adjusted": sessions
            .iter()
            .zip(&adjusted)
            .map(|((id, before), after)| json!({
                "sessionId": id,
                "before": before,
                "after": after,
                "grade": letter_grade(*after),
            }))
            .collect::<Vec<_>>(),
    })))
}

/// Aggregate statistics for one exam: score distribution plus per-question
/// success rate (a proxy for observed difficulty).
pub async fn exam_analytics(
    State(pool): State<PgPool>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let scores: Vec<f64> = sqlx::query_scalar(
        r#"
        SELECT total_score FROM exam_sessions
        WHERE exam_id = $1 AND status = 'graded' AND total_score IS NOT NULL
        "#,
    )
    .bind(exam_id)
    .fetch_all(&pool)
    .await?;

    let (average, deviation) = if scores.is_empty() {
        (None, None)
    } else {
        let m = mean(&scores);
        (Some(m), Some(stddev(&scores, m)))
    };

    let per_question: Vec<(i64, i64, i64)> = sqlx::query_as(
        r#"
        SELECT a.question_id, COUNT(*), COUNT(*) FILTER (WHERE a.is_correct)
        FROM answers a
        JOIN exam_sessions s ON a.session_id = s.id
        WHERE s.exam_id = $1
        GROUP BY a.question_id
        ORDER BY a.question_id
        "#,
    )
    .bind(exam_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(json!({
        "examId": exam_id,
        "sessions": scores.len(),
        "average": average,
        "standardDeviation": deviation,
        "questions": per_question
            .into_iter()
            .map(|(question_id, attempts, correct)| json!({
                "questionId": question_id,
                "attempts": attempts,
                "correct": correct,
                "successRate": if attempts > 0 {
                    correct as f64 / attempts as f64
                } else {
                    0.0
                },
            }))
            .collect::<Vec<_>>(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banding_boundaries_are_inclusive_at_the_bottom() {
        assert_eq!(letter_grade(100.0), "A");
        assert_eq!(letter_grade(90.0), "A");
        assert_eq!(letter_grade(89.999), "B");
        assert_eq!(letter_grade(80.0), "B");
        assert_eq!(letter_grade(70.0), "C");
        assert_eq!(letter_grade(60.0), "D");
        assert_eq!(letter_grade(59.999), "F");
        assert_eq!(letter_grade(0.0), "F");
    }

    #[test]
    fn curve_hits_the_target_mean() {
        let adjusted = gaussian_adjust(&[40.0, 50.0, 60.0, 70.0, 80.0]);
        let m = mean(&adjusted);
        assert!((m - 70.0).abs() < 1e-9);
    }

    #[test]
    fn curve_preserves_ordering() {
        let adjusted = gaussian_adjust(&[35.0, 55.0, 95.0]);
        assert!(adjusted[0] < adjusted[1]);
        assert!(adjusted[1] < adjusted[2]);
    }

    #[test]
    fn curve_on_identical_scores_moves_everyone_to_the_mean() {
        let adjusted = gaussian_adjust(&[42.0, 42.0, 42.0]);
        assert!(adjusted.iter().all(|&s| (s - 70.0).abs() < 1e-9));
    }

    #[test]
    fn curve_clamps_outliers() {
        let adjusted = gaussian_adjust(&[0.0, 0.0, 0.0, 0.0, 100.0]);
        assert!(adjusted.iter().all(|&s| (0.0..=100.0).contains(&s)));
    }

    #[test]
    fn curve_on_empty_input_is_empty() {
        assert!(gaussian_adjust(&[]).is_empty());
    }

    #[test]
    fn performance_labels() {
        assert_eq!(performance_label(95.0), "Excelente");
        assert_eq!(performance_label(75.0), "Bueno");
        assert_eq!(performance_label(65.0), "Regular");
        assert_eq!(performance_label(10.0), "Deficiente");
    }
}
