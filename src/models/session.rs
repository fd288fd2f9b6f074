// src/models/session.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;

/// Lifecycle of one student's timed attempt at an exam.
///
/// `not_started → in_progress ⇄ paused → submitted → graded`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "session_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    NotStarted,
    InProgress,
    Paused,
    Submitted,
    Graded,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::NotStarted => "not_started",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Paused => "paused",
            SessionStatus::Submitted => "submitted",
            SessionStatus::Graded => "graded",
        }
    }

    /// A session counts as live while a new attempt must be refused.
    pub fn is_live(&self) -> bool {
        matches!(self, SessionStatus::InProgress | SessionStatus::Paused)
    }

    /// Whether a transition from `self` to `to` is allowed.
    pub fn can_transition(&self, to: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, to),
            (NotStarted, InProgress)
                | (InProgress, Paused)
                | (Paused, InProgress)
                | (InProgress, Submitted)
                | (Paused, Submitted)
                | (Submitted, Graded)
        )
    }
}

/// Represents the 'exam_sessions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExamSession {
    pub id: i64,
    pub exam_id: i64,
    pub student_id: i64,
    pub status: SessionStatus,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub resumed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub elapsed_seconds: i64,
    pub total_score: Option<f64>,
    pub grade: Option<String>,
}

/// DTO for submitting a session's answers.
/// Key: question id. Value: the student's answer.
#[derive(Debug, Deserialize)]
pub struct SubmitExamRequest {
    pub answers: HashMap<i64, String>,
}

/// Represents one graded row of the 'answers' table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Answer {
    pub id: i64,
    pub session_id: i64,
    pub question_id: i64,
    pub answer: String,
    pub is_correct: Option<bool>,
    pub points_awarded: Option<f64>,
    pub review_comment: Option<String>,
    pub reviewed_by: Option<i64>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[cfg(test)]
mod tests {
    use super::SessionStatus::*;

    #[test]
    fn pause_only_from_in_progress() {
        assert!(InProgress.can_transition(Paused));
        assert!(!Paused.can_transition(Paused));
        assert!(!Submitted.can_transition(Paused));
        assert!(!Graded.can_transition(Paused));
    }

    #[test]
    fn resume_only_from_paused() {
        assert!(Paused.can_transition(InProgress));
        assert!(!InProgress.can_transition(InProgress));
        assert!(!Graded.can_transition(InProgress));
    }

    #[test]
    fn submit_from_in_progress_or_paused_only() {
        assert!(InProgress.can_transition(Submitted));
        assert!(Paused.can_transition(Submitted));
        assert!(!NotStarted.can_transition(Submitted));
        assert!(!Submitted.can_transition(Submitted));
        assert!(!Graded.can_transition(Submitted));
    }

    #[test]
    fn live_states() {
        assert!(InProgress.is_live());
        assert!(Paused.is_live());
        assert!(!NotStarted.is_live());
        assert!(!Submitted.is_live());
        assert!(!Graded.is_live());
    }
}
