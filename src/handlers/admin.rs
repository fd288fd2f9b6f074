// src/handlers/admin.rs
//
// Administrator management, exam templates, group scheduling and the
// dashboard. Everything here sits behind the role/permission middleware;
// the only in-handler authorization rule is the self-delete guard.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::PgPool;
use std::str::FromStr;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        exam::{CreateTemplateRequest, Exam, ExamTemplate, ScheduleExamRequest},
        group::{AssignStudentsRequest, CreateGroupRequest, Group},
        user::{CreateAdminRequest, UpdateAdminRequest, User},
    },
    permissions::Role,
    services::{audit, notifier::Notification},
    state::AppState,
    utils::{hash::hash_password, jwt::Claims},
};

const USER_COLUMNS: &str = "id, name, email, password, role, must_change_password, created_at";

pub async fn create_admin(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateAdminRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    let role = Role::from_str(&payload.role)
        .map_err(|_| AppError::BadRequest(format!("Unknown role '{}'", payload.role)))?;

    let hashed_password = hash_password(&payload.password)?;

    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users (name, email, password, role)
        VALUES ($1, $2, $3, $4)
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(&hashed_password)
    .bind(role.as_str())
    .fetch_one(&state.pool)
    .await
    .map_err(|e| {
        if e.to_string().contains("unique constraint") || e.to_string().contains("23505") {
            AppError::Conflict(format!("Email '{}' already exists", payload.email))
        } else {
            AppError::from(e)
        }
    })?;

    audit::log_action(
        &state.pool,
        claims.user_id()?,
        "create_admin",
        json!({ "createdId": user.id, "role": user.role }),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(json!({ "data": user }))))
}

pub async fn list_admins(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let admins = sqlx::query_as::<_, User>(&format!(
        r#"
        SELECT {USER_COLUMNS} FROM users
        WHERE role IN ('super_admin', 'admin', 'teacher')
        ORDER BY id
        "#
    ))
    .fetch_all(&pool)
    .await?;

    Ok(Json(json!({ "data": admins })))
}

pub async fn update_admin(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateAdminRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(role) = &payload.role {
        Role::from_str(role)
            .map_err(|_| AppError::BadRequest(format!("Unknown role '{role}'")))?;
    }

    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        UPDATE users SET
            name = COALESCE($2, name),
            email = COALESCE($3, email),
            role = COALESCE($4, role)
        WHERE id = $1
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(&payload.role)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound("User not found".to_string()))?;

    audit::log_action(
        &state.pool,
        claims.user_id()?,
        "update_admin",
        json!({ "updatedId": id }),
    )
    .await?;

    Ok(Json(json!({ "data": user })))
}

/// Deletes an administrator account. Deleting yourself is refused so the
/// last super admin cannot lock everyone out by accident.
pub async fn delete_admin(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if id == claims.user_id()? {
        return Err(AppError::Forbidden(
            "You cannot delete your own account".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM users WHERE id = $1 AND role != 'student'")
        .bind(id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    audit::log_action(
        &state.pool,
        claims.user_id()?,
        "delete_admin",
        json!({ "deletedId": id }),
    )
    .await?;

    Ok(Json(json!({ "message": "User deleted" })))
}

/// Creates a reusable exam template with an optional question pool.
pub async fn create_template(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateTemplateRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let mut tx = pool.begin().await?;

    let template = sqlx::query_as::<_, ExamTemplate>(
        r#"
        INSERT INTO exam_templates (name, description, subject_id, duration_minutes, max_attempts)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, name, description, subject_id, duration_minutes, max_attempts, created_at
        "#,
    )
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(&payload.subject_id)
    .bind(payload.duration)
    .bind(payload.max_attempts)
    .fetch_one(&mut *tx)
    .await?;

    for question_id in &payload.questions {
        sqlx::query("INSERT INTO template_questions (template_id, question_id) VALUES ($1, $2)")
            .bind(template.id)
            .bind(question_id)
            .execute(&mut *tx)
            .await
            .map_err(|_| {
                AppError::BadRequest(format!("Question {question_id} does not exist"))
            })?;
    }

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(json!({ "data": template }))))
}

pub async fn list_templates(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let templates = sqlx::query_as::<_, ExamTemplate>(
        r#"
        SELECT id, name, description, subject_id, duration_minutes, max_attempts, created_at
        FROM exam_templates
        ORDER BY id
        "#,
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(json!({ "data": templates })))
}

/// Materializes a concrete exam from a template, carrying its question pool.
pub async fn generate_exam(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(template_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let template = sqlx::query_as::<_, ExamTemplate>(
        r#"
        SELECT id, name, description, subject_id, duration_minutes, max_attempts, created_at
        FROM exam_templates
        WHERE id = $1
        "#,
    )
    .bind(template_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound("Template not found".to_string()))?;

    let mut tx = state.pool.begin().await?;

    let exam = sqlx::query_as::<_, Exam>(
        r#"
        INSERT INTO exams (title, description, subject_id, duration_minutes, max_attempts)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, title, description, subject_id, duration_minutes,
                  start_date, end_date, max_attempts, created_at
        "#,
    )
    .bind(&template.name)
    .bind(&template.description)
    .bind(&template.subject_id)
    .bind(template.duration_minutes)
    .bind(template.max_attempts)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO exam_questions (exam_id, question_id)
        SELECT $1, question_id FROM template_questions WHERE template_id = $2
        "#,
    )
    .bind(exam.id)
    .bind(template_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    audit::log_action(
        &state.pool,
        claims.user_id()?,
        "generate_exam",
        json!({ "templateId": template_id, "examId": exam.id }),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(json!({ "data": exam }))))
}

/// Schedules an exam window for a group and notifies its connected students.
pub async fn schedule_exam(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ScheduleExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.end_date <= payload.start_date {
        return Err(AppError::BadRequest(
            "End date must be after start date".to_string(),
        ));
    }

    let schedule_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO exam_schedules (exam_id, group_id, start_date, end_date)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(payload.exam_id)
    .bind(payload.group_id)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .fetch_one(&state.pool)
    .await
    .map_err(|_| AppError::BadRequest("Exam or group does not exist".to_string()))?;

    let student_ids: Vec<i64> =
        sqlx::query_scalar("SELECT student_id FROM group_students WHERE group_id = $1")
            .bind(payload.group_id)
            .fetch_all(&state.pool)
            .await?;

    let notification = Notification::new(
        "exam_scheduled",
        "An exam has been scheduled for your group",
        json!({
            "examId": payload.exam_id,
            "startDate": payload.start_date,
            "endDate": payload.end_date,
        }),
    );
    for student_id in &student_ids {
        state.notifier.notify_user(*student_id, &notification);
    }

    audit::log_action(
        &state.pool,
        claims.user_id()?,
        "schedule_exam",
        json!({ "scheduleId": schedule_id, "examId": payload.exam_id, "groupId": payload.group_id }),
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "scheduleId": schedule_id, "notified": student_ids.len() })),
    ))
}

pub async fn create_group(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let group = sqlx::query_as::<_, Group>(
        r#"
        INSERT INTO groups (name, description)
        VALUES ($1, $2)
        RETURNING id, name, description, created_at
        "#,
    )
    .bind(&payload.name)
    .bind(&payload.description)
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(json!({ "data": group }))))
}

pub async fn list_groups(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let groups = sqlx::query_as::<_, Group>(
        "SELECT id, name, description, created_at FROM groups ORDER BY id",
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(json!({ "data": groups })))
}

/// Replaces a group's membership with the given student set.
pub async fn assign_students(
    State(pool): State<PgPool>,
    Path(group_id): Path<i64>,
    Json(payload): Json<AssignStudentsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM groups WHERE id = $1")
        .bind(group_id)
        .fetch_optional(&pool)
        .await?;
    exists.ok_or(AppError::NotFound("Group not found".to_string()))?;

    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM group_students WHERE group_id = $1")
        .bind(group_id)
        .execute(&mut *tx)
        .await?;

    for student_id in &payload.student_ids {
        sqlx::query("INSERT INTO group_students (group_id, student_id) VALUES ($1, $2)")
            .bind(group_id)
            .bind(student_id)
            .execute(&mut *tx)
            .await
            .map_err(|_| {
                AppError::BadRequest(format!("Student {student_id} does not exist"))
            })?;
    }

    tx.commit().await?;

    Ok(Json(json!({
        "groupId": group_id,
        "assigned": payload.student_ids.len(),
    })))
}

/// Headline counts for the admin dashboard.
pub async fn dashboard_stats(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let students: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM students")
        .fetch_one(&pool)
        .await?;
    let questions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM questions")
        .fetch_one(&pool)
        .await?;
    let exams: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM exams")
        .fetch_one(&pool)
        .await?;
    let graded_sessions: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM exam_sessions WHERE status = 'graded'")
            .fetch_one(&pool)
            .await?;
    let average_score: Option<f64> = sqlx::query_scalar(
        "SELECT AVG(total_score) FROM exam_sessions WHERE status = 'graded'",
    )
    .fetch_one(&pool)
    .await?;

    Ok(Json(json!({
        "students": students,
        "questions": questions,
        "exams": exams,
        "gradedSessions": graded_sessions,
        "averageScore": average_score,
    })))
}
