// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

/// Question types supported by the bank.
pub const QUESTION_TYPES: &[&str] = &["multiple_choice", "true_false", "essay"];

/// Essay answers cannot be auto-graded and wait for manual review.
pub fn is_open_ended(question_type: &str) -> bool {
    question_type == "essay"
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    pub subject_id: String,
    pub subcategory_id: String,

    /// 'multiple_choice', 'true_false' or 'essay'.
    pub question_type: String,

    /// The text content of the question.
    pub content: String,

    /// List of options (e.g., ["Option A", "Option B"]).
    /// Stored as a JSON array in the database.
    pub options: Json<Vec<String>>,

    /// The correct answer key or content.
    pub correct_answer: String,

    pub points: f64,

    /// Difficulty on a 1-5 scale.
    pub difficulty: i32,

    pub created_by: i64,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for sending a question to students (excludes the correct answer).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub id: i64,
    pub subject_id: String,
    pub subcategory_id: String,
    #[serde(rename = "type")]
    pub question_type: String,
    pub content: String,
    pub options: Json<Vec<String>>,
    pub points: f64,
    pub difficulty: i32,
}

impl From<Question> for PublicQuestion {
    fn from(q: Question) -> Self {
        PublicQuestion {
            id: q.id,
            subject_id: q.subject_id,
            subcategory_id: q.subcategory_id,
            question_type: q.question_type,
            content: q.content,
            options: q.options,
            points: q.points,
            difficulty: q.difficulty,
        }
    }
}

/// DTO for creating a new question.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 50))]
    pub subject_id: String,
    #[validate(length(min = 1, max = 50))]
    pub subcategory_id: String,
    #[validate(custom(function = validate_question_type))]
    #[serde(rename = "type")]
    pub question_type: String,
    #[validate(length(min = 1, max = 1000))]
    pub content: String,
    #[validate(custom(function = validate_options))]
    #[serde(default)]
    pub options: Vec<String>,
    #[validate(length(max = 500))]
    pub correct_answer: String,
    #[validate(range(min = 0.0, max = 100.0))]
    pub points: f64,
    #[validate(range(min = 1, max = 5))]
    #[serde(default = "default_difficulty")]
    pub difficulty: i32,
}

fn default_difficulty() -> i32 {
    1
}

fn validate_question_type(question_type: &str) -> Result<(), validator::ValidationError> {
    if QUESTION_TYPES.contains(&question_type) {
        Ok(())
    } else {
        Err(validator::ValidationError::new("unknown_question_type"))
    }
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    for opt in options {
        if opt.len() > 500 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}

/// DTO for updating a question. Fields are optional.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuestionRequest {
    #[serde(rename = "type")]
    pub question_type: Option<String>,
    pub content: Option<String>,
    pub options: Option<Vec<String>>,
    pub correct_answer: Option<String>,
    pub points: Option<f64>,
    pub difficulty: Option<i32>,
}

/// Query parameters for question search.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub subject_id: Option<String>,
    pub subcategory_id: Option<String>,
    pub difficulty: Option<i32>,
    #[serde(rename = "type")]
    pub question_type: Option<String>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// DTO for the answer-check endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckAnswerRequest {
    pub question_id: i64,
    pub answer: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn essay_is_open_ended() {
        assert!(is_open_ended("essay"));
        assert!(!is_open_ended("multiple_choice"));
        assert!(!is_open_ended("true_false"));
    }

    #[test]
    fn rejects_unknown_question_type() {
        let req = CreateQuestionRequest {
            subject_id: "math".into(),
            subcategory_id: "algebra".into(),
            question_type: "matching".into(),
            content: "2x + 3 = 7".into(),
            options: vec!["2".into(), "3".into()],
            correct_answer: "2".into(),
            points: 1.0,
            difficulty: 1,
        };
        assert!(req.validate().is_err());
    }
}
