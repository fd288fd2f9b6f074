// src/handlers/education.rs
//
// Subject catalog, exam CRUD and the session lifecycle
// (start / pause / resume / submit). Every lifecycle transition is one
// status-guarded UPDATE; zero affected rows means the session does not exist,
// is not the caller's, or is in the wrong state.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::AppError,
    handlers::evaluation::recompute_session_score,
    models::{
        exam::{CreateExamRequest, Exam},
        question::{PublicQuestion, Question, is_open_ended},
        session::{ExamSession, SubmitExamRequest},
        subject::{SUBJECTS, subcategory_info, subject_info},
    },
    permissions::Permission,
    services::notifier::Notification,
    state::AppState,
    utils::jwt::{Claims, ensure_permissions},
};

const SESSION_COLUMNS: &str = "id, exam_id, student_id, status, started_at, resumed_at, \
                               finished_at, elapsed_seconds, total_score, grade";

/// The subject catalog is static reference data, served straight from memory.
pub async fn get_subjects() -> impl IntoResponse {
    Json(json!({ "data": SUBJECTS }))
}

/// Creates an exam and assigns its question set in one transaction.
pub async fn create_exam(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    ensure_permissions(&claims, &[Permission::ManageCourses])?;

    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    if subcategory_info(&payload.subject_id, &payload.subcategory_id).is_none() {
        return Err(AppError::BadRequest(format!(
            "Unknown subject/subcategory combination '{}/{}'",
            payload.subject_id, payload.subcategory_id
        )));
    }
    if let (Some(start), Some(end)) = (payload.start_date, payload.end_date) {
        if end <= start {
            return Err(AppError::BadRequest(
                "End date must be after start date".to_string(),
            ));
        }
    }

    let mut tx = pool.begin().await?;

    let exam = sqlx::query_as::<_, Exam>(
        r#"
        INSERT INTO exams (title, description, subject_id, duration_minutes,
                           start_date, end_date, max_attempts)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, title, description, subject_id, duration_minutes,
                  start_date, end_date, max_attempts, created_at
        "#,
    )
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(&payload.subject_id)
    .bind(payload.duration)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(payload.max_attempts)
    .fetch_one(&mut *tx)
    .await?;

    for question_id in &payload.questions {
        sqlx::query("INSERT INTO exam_questions (exam_id, question_id) VALUES ($1, $2)")
            .bind(exam.id)
            .bind(question_id)
            .execute(&mut *tx)
            .await
            .map_err(|_| {
                AppError::BadRequest(format!("Question {question_id} does not exist"))
            })?;
    }

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(json!({ "data": exam }))))
}

pub async fn list_exams(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let exams = sqlx::query_as::<_, Exam>(
        r#"
        SELECT id, title, description, subject_id, duration_minutes,
               start_date, end_date, max_attempts, created_at
        FROM exams
        ORDER BY id
        "#,
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(json!({ "data": exams })))
}

/// Fetches an exam with its questions (answers stripped) and catalog names.
pub async fn get_exam(
    State(pool): State<PgPool>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exam = sqlx::query_as::<_, Exam>(
        r#"
        SELECT id, title, description, subject_id, duration_minutes,
               start_date, end_date, max_attempts, created_at
        FROM exams
        WHERE id = $1
        "#,
    )
    .bind(exam_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Exam not found".to_string()))?;

    let questions = sqlx::query_as::<_, Question>(
        r#"
        SELECT q.id, q.subject_id, q.subcategory_id, q.question_type, q.content,
               q.options, q.correct_answer, q.points, q.difficulty, q.created_by,
               q.created_at
        FROM questions q
        JOIN exam_questions eq ON eq.question_id = q.id
        WHERE eq.exam_id = $1
        ORDER BY q.id
        "#,
    )
    .bind(exam_id)
    .fetch_all(&pool)
    .await?;

    let subject_name = subject_info(&exam.subject_id).map(|s| s.name);
    let public: Vec<PublicQuestion> = questions.into_iter().map(PublicQuestion::from).collect();

    Ok(Json(json!({
        "data": exam,
        "subjectName": subject_name,
        "questions": public,
    })))
}

/// Starts an attempt. The partial unique index on live sessions is what
/// actually enforces one attempt at a time; a violation surfaces as 400.
pub async fn start_exam(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;

    // A live attempt at any exam blocks starting another one.
    if state.anti_cheat.is_monitored(student_id) {
        return Err(AppError::Conflict("Multiple sessions detected".to_string()));
    }

    let max_attempts: Option<i32> =
        sqlx::query_scalar("SELECT max_attempts FROM exams WHERE id = $1")
            .bind(exam_id)
            .fetch_optional(&state.pool)
            .await?;

    let max_attempts = max_attempts.ok_or(AppError::NotFound("Exam not found".to_string()))?;

    let attempts: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM exam_sessions WHERE exam_id = $1 AND student_id = $2",
    )
    .bind(exam_id)
    .bind(student_id)
    .fetch_one(&state.pool)
    .await?;

    if attempts >= max_attempts as i64 {
        return Err(AppError::Forbidden("Maximum attempts reached".to_string()));
    }

    let session = sqlx::query_as::<_, ExamSession>(&format!(
        r#"
        INSERT INTO exam_sessions (exam_id, student_id, status)
        VALUES ($1, $2, 'in_progress')
        RETURNING {SESSION_COLUMNS}
        "#
    ))
    .bind(exam_id)
    .bind(student_id)
    .fetch_one(&state.pool)
    .await
    .map_err(|e| {
        if e.to_string().contains("idx_live_session") {
            AppError::BadRequest(
                "You already have an active session for this exam".to_string(),
            )
        } else {
            AppError::from(e)
        }
    })?;

    state
        .anti_cheat
        .start_monitoring(&state.pool, session.id, student_id)
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "data": session }))))
}

pub async fn get_session(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = sqlx::query_as::<_, ExamSession>(&format!(
        "SELECT {SESSION_COLUMNS} FROM exam_sessions WHERE id = $1 AND student_id = $2"
    ))
    .bind(session_id)
    .bind(claims.user_id()?)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Session not found".to_string()))?;

    Ok(Json(json!({ "data": session })))
}

/// Pauses a running session, banking the elapsed time so far.
pub async fn pause_session(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = sqlx::query_as::<_, ExamSession>(&format!(
        r#"
        UPDATE exam_sessions
        SET status = 'paused',
            elapsed_seconds = elapsed_seconds
                + EXTRACT(EPOCH FROM (NOW() - COALESCE(resumed_at, started_at)))::BIGINT
        WHERE id = $1 AND student_id = $2 AND status = 'in_progress'
        RETURNING {SESSION_COLUMNS}
        "#
    ))
    .bind(session_id)
    .bind(claims.user_id()?)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound(
        "Session not found or invalid state".to_string(),
    ))?;

    Ok(Json(json!({ "data": session })))
}

pub async fn resume_session(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = sqlx::query_as::<_, ExamSession>(&format!(
        r#"
        UPDATE exam_sessions
        SET status = 'in_progress', resumed_at = NOW()
        WHERE id = $1 AND student_id = $2 AND status = 'paused'
        RETURNING {SESSION_COLUMNS}
        "#
    ))
    .bind(session_id)
    .bind(claims.user_id()?)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound(
        "Session not found or invalid state".to_string(),
    ))?;

    Ok(Json(json!({ "data": session })))
}

/// Submits a session: persists answers, auto-grades everything that has a
/// stored key, bands the normalized total, and closes monitoring. Essay
/// answers are stored ungraded and enter the total after manual review.
pub async fn submit_exam(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<i64>,
    Json(payload): Json<SubmitExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id()?;

    let session = sqlx::query_as::<_, ExamSession>(&format!(
        r#"
        UPDATE exam_sessions
        SET status = 'submitted',
            finished_at = NOW(),
            elapsed_seconds = elapsed_seconds
                + CASE WHEN status = 'in_progress'
                    THEN EXTRACT(EPOCH FROM (NOW() - COALESCE(resumed_at, started_at)))::BIGINT
                    ELSE 0 END
        WHERE id = $1 AND student_id = $2 AND status IN ('in_progress', 'paused')
        RETURNING {SESSION_COLUMNS}
        "#
    ))
    .bind(session_id)
    .bind(student_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound(
        "Session not found or invalid state".to_string(),
    ))?;

    let questions = sqlx::query_as::<_, Question>(
        r#"
        SELECT q.id, q.subject_id, q.subcategory_id, q.question_type, q.content,
               q.options, q.correct_answer, q.points, q.difficulty, q.created_by,
               q.created_at
        FROM questions q
        JOIN exam_questions eq ON eq.question_id = q.id
        WHERE eq.exam_id = $1
        "#,
    )
    .bind(session.exam_id)
    .fetch_all(&state.pool)
    .await?;

    let mut pending_review = 0;
    for question in &questions {
        let answer = payload.answers.get(&question.id);

        if is_open_ended(&question.question_type) {
            // Stored without a verdict; a reviewer awards the points later.
            let Some(answer) = answer else { continue };
            pending_review += 1;
            sqlx::query(
                "INSERT INTO answers (session_id, question_id, answer) VALUES ($1, $2, $3)",
            )
            .bind(session_id)
            .bind(question.id)
            .bind(answer)
            .execute(&state.pool)
            .await?;
            continue;
        }

        // Objective questions always get a row so an unanswered question
        // still weighs into the denominator.
        let answer = answer.map(String::as_str).unwrap_or("");
        let is_correct = answer == question.correct_answer;
        let points_awarded = if is_correct { question.points } else { 0.0 };

        sqlx::query(
            r#"
            INSERT INTO answers (session_id, question_id, answer, is_correct, points_awarded)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(session_id)
        .bind(question.id)
        .bind(answer)
        .bind(is_correct)
        .bind(points_awarded)
        .execute(&state.pool)
        .await?;
    }

    let (score, grade) = recompute_session_score(&state.pool, session_id).await?;

    sqlx::query("UPDATE exam_sessions SET status = 'graded' WHERE id = $1")
        .bind(session_id)
        .execute(&state.pool)
        .await?;

    state.anti_cheat.stop_monitoring(&state.pool, session_id).await?;
    let analysis = state.anti_cheat.analyze_session(&state.pool, session_id).await?;

    // Feed the per-subject profile so future difficulty predictions move.
    let subject_id: Option<String> =
        sqlx::query_scalar("SELECT subject_id FROM exams WHERE id = $1")
            .bind(session.exam_id)
            .fetch_optional(&state.pool)
            .await?;
    if let Some(subject_id) = subject_id {
        state
            .recommender
            .update_profile(student_id, &subject_id, score / 100.0);
    }

    state.notifier.notify_user(
        student_id,
        &Notification::new(
            "exam_graded",
            "Your exam has been graded",
            json!({ "sessionId": session_id, "totalScore": score, "grade": grade }),
        ),
    );

    Ok(Json(json!({
        "sessionId": session_id,
        "totalScore": score,
        "grade": grade,
        "pendingReview": pending_review,
        "suspicious": analysis.suspicious,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringEventRequest {
    pub event_type: String,
    #[serde(default)]
    pub active_window: String,
}

/// Records one proctoring event for the caller's open monitoring window.
/// Events against someone else's session find no window and 404.
pub async fn record_monitoring_event(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<i64>,
    Json(payload): Json<MonitoringEventRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .anti_cheat
        .record_event(
            &state.pool,
            session_id,
            claims.user_id()?,
            &payload.event_type,
            &payload.active_window,
        )
        .await?;

    Ok(Json(json!({ "message": "Event recorded" })))
}

/// Re-runs the analysis strategy over a session's recorded events.
pub async fn session_analysis(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let analysis = state.anti_cheat.analyze_session(&state.pool, session_id).await?;
    Ok(Json(json!({ "sessionId": session_id, "analysis": analysis })))
}

/// Drops every cached response. Manual escape hatch for stale data.
pub async fn flush_cache(State(state): State<AppState>) -> impl IntoResponse {
    state.cache.flush().await;
    Json(json!({ "message": "Cache flushed" }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendNotificationRequest {
    pub user_id: Option<i64>,
    pub topic: Option<String>,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

fn default_kind() -> String {
    "announcement".to_string()
}

/// Pushes a notification to one user, one topic's subscribers, or everyone.
pub async fn send_notification(
    State(state): State<AppState>,
    Json(payload): Json<SendNotificationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let notification = Notification::new(&payload.kind, &payload.message, payload.data.clone());

    match (payload.user_id, &payload.topic) {
        (Some(user_id), _) => state.notifier.notify_user(user_id, &notification),
        (None, Some(topic)) => state.notifier.notify_subscribers(topic, &notification),
        (None, None) => state.notifier.notify_all(&notification),
    }

    Ok(Json(json!({ "message": "Notification dispatched" })))
}
