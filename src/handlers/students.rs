// src/handlers/students.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    config::DEFAULT_STUDENT_PASSWORD,
    error::AppError,
    models::student::{CreateStudentRequest, Student},
    permissions::Permission,
    state::AppState,
    utils::{
        hash::hash_password,
        jwt::{Claims, ensure_permissions},
    },
};

/// Enrolls a student.
///
/// Also provisions a login account with the default credential and the
/// must-change-password flag set, so the first thing the student can do is
/// reset it.
pub async fn create_student(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateStudentRequest>,
) -> Result<impl IntoResponse, AppError> {
    ensure_permissions(&claims, &[Permission::ManageStudents])?;

    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    if payload.date_of_birth > chrono::Utc::now().date_naive() {
        return Err(AppError::BadRequest(
            "Date of birth cannot be in the future".to_string(),
        ));
    }

    let hashed_password = hash_password(DEFAULT_STUDENT_PASSWORD)?;
    let full_name = format!("{} {}", payload.name, payload.last_name);

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO users (name, email, password, role, must_change_password)
        VALUES ($1, $2, $3, 'student', TRUE)
        "#,
    )
    .bind(&full_name)
    .bind(&payload.email)
    .bind(&hashed_password)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        if e.to_string().contains("unique constraint") || e.to_string().contains("23505") {
            AppError::Conflict(format!("Email '{}' already exists", payload.email))
        } else {
            tracing::error!("Failed to create student user: {:?}", e);
            AppError::from(e)
        }
    })?;

    let student = sqlx::query_as::<_, Student>(
        r#"
        INSERT INTO students (name, last_name, email, date_of_birth, phone_number, address)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, name, last_name, email, date_of_birth, phone_number, address,
                  created_at, updated_at
        "#,
    )
    .bind(&payload.name)
    .bind(&payload.last_name)
    .bind(&payload.email)
    .bind(payload.date_of_birth)
    .bind(payload.phone_number.as_deref().unwrap_or(""))
    .bind(payload.address.as_deref().unwrap_or(""))
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if e.to_string().contains("unique constraint") || e.to_string().contains("23505") {
            AppError::Conflict(format!("Email '{}' already exists", payload.email))
        } else {
            tracing::error!("Failed to create student: {:?}", e);
            AppError::from(e)
        }
    })?;

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(json!({ "data": student }))))
}

/// Lists all enrolled students.
pub async fn list_students(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let students = sqlx::query_as::<_, Student>(
        r#"
        SELECT id, name, last_name, email, date_of_birth, phone_number, address,
               created_at, updated_at
        FROM students
        ORDER BY id
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list students: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(json!({ "data": students })))
}

/// Fetches one student by id.
pub async fn get_student(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student = sqlx::query_as::<_, Student>(
        r#"
        SELECT id, name, last_name, email, date_of_birth, phone_number, address,
               created_at, updated_at
        FROM students
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Student not found".to_string()))?;

    Ok(Json(json!({ "data": student })))
}
