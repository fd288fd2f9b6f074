// src/models/exam.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'exams' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Exam {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub subject_id: String,
    pub duration_minutes: i32,
    pub start_date: Option<chrono::DateTime<chrono::Utc>>,
    pub end_date: Option<chrono::DateTime<chrono::Utc>>,
    pub max_attempts: i32,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating an exam. The question set is assigned in the same call.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateExamRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[validate(length(min = 1, max = 50))]
    pub subject_id: String,
    #[validate(length(min = 1, max = 50))]
    pub subcategory_id: String,
    #[validate(range(min = 1, max = 600))]
    pub duration: i32,
    pub start_date: Option<chrono::DateTime<chrono::Utc>>,
    pub end_date: Option<chrono::DateTime<chrono::Utc>>,
    #[validate(range(min = 1, max = 10))]
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
    #[serde(default)]
    pub questions: Vec<i64>,
}

fn default_max_attempts() -> i32 {
    1
}

/// Represents the 'exam_templates' table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExamTemplate {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub subject_id: String,
    pub duration_minutes: i32,
    pub max_attempts: i32,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating a reusable exam template.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTemplateRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[validate(length(min = 1, max = 50))]
    pub subject_id: String,
    #[validate(range(min = 1, max = 600))]
    #[serde(default = "default_duration")]
    pub duration: i32,
    #[validate(range(min = 1, max = 10))]
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
    #[serde(default)]
    pub questions: Vec<i64>,
}

fn default_duration() -> i32 {
    60
}

/// DTO for scheduling an exam for a group.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleExamRequest {
    pub exam_id: i64,
    pub group_id: i64,
    pub start_date: chrono::DateTime<chrono::Utc>,
    pub end_date: chrono::DateTime<chrono::Utc>,
}
