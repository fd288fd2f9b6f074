// src/models/student.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'students' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub last_name: String,
    pub email: String,
    pub date_of_birth: chrono::NaiveDate,
    pub phone_number: String,
    pub address: String,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for enrolling a student.
/// Enrollment also provisions a user account with the default credential.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateStudentRequest {
    #[validate(length(min = 1, max = 100, message = "Name is required."))]
    pub name: String,
    #[validate(length(min = 1, max = 100, message = "Last name is required."))]
    pub last_name: String,
    #[validate(email(message = "A valid email is required."))]
    pub email: String,
    pub date_of_birth: chrono::NaiveDate,
    pub phone_number: Option<String>,
    pub address: Option<String>,
}
