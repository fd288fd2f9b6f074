// src/services/anti_cheat.rs
//
// Toy monitoring heuristics behind a pluggable strategy. Not load-bearing
// security logic; the active-session map is the only state this service owns
// and it is invalidated on stop_monitoring.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::AppError;

/// One captured activity event of a monitored session.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MonitoringEvent {
    pub event_type: String,
    pub active_window: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuspiciousPattern {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub suspicious: bool,
    pub patterns: Vec<SuspiciousPattern>,
}

/// Strategy seam for session analysis. The default is a placeholder
/// heuristic; real detection would slot in here.
#[async_trait]
pub trait AnalysisStrategy: Send + Sync {
    async fn analyze(&self, events: &[MonitoringEvent]) -> Analysis;
}

/// Flags bursts of events less than a second apart and active-window
/// switches; more than 3 accumulated patterns marks the session suspicious.
pub struct PatternHeuristic;

#[async_trait]
impl AnalysisStrategy for PatternHeuristic {
    async fn analyze(&self, events: &[MonitoringEvent]) -> Analysis {
        let mut patterns = Vec::new();

        for pair in events.windows(2) {
            let (current, next) = (&pair[0], &pair[1]);

            if (next.created_at - current.created_at).num_milliseconds() < 1000 {
                patterns.push(SuspiciousPattern {
                    kind: "QUICK_CHANGE",
                    timestamp: current.created_at,
                });
            }

            if current.active_window != next.active_window {
                patterns.push(SuspiciousPattern {
                    kind: "WINDOW_CHANGE",
                    timestamp: current.created_at,
                });
            }
        }

        Analysis {
            suspicious: patterns.len() > 3,
            patterns,
        }
    }
}

/// Owns the in-memory map of actively monitored students.
pub struct AntiCheat {
    active: Mutex<HashMap<i64, i64>>,
    strategy: Box<dyn AnalysisStrategy>,
}

impl Default for AntiCheat {
    fn default() -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
            strategy: Box::new(PatternHeuristic),
        }
    }
}

impl AntiCheat {
    /// Begins monitoring an exam session. A student with a session already
    /// under monitoring is refused.
    pub async fn start_monitoring(
        &self,
        pool: &PgPool,
        session_id: i64,
        student_id: i64,
    ) -> Result<i64, AppError> {
        {
            let mut active = self.active.lock().unwrap();
            if active.contains_key(&student_id) {
                return Err(AppError::Conflict("Multiple sessions detected".to_string()));
            }
            active.insert(student_id, session_id);
        }

        let monitoring_id: i64 = sqlx::query_scalar(
            "INSERT INTO monitoring_sessions (session_id, student_id) VALUES ($1, $2) RETURNING id",
        )
        .bind(session_id)
        .bind(student_id)
        .fetch_one(pool)
        .await
        .inspect_err(|_| {
            self.active.lock().unwrap().remove(&student_id);
        })?;

        Ok(monitoring_id)
    }

    /// Ends monitoring and invalidates the in-memory entry.
    pub async fn stop_monitoring(&self, pool: &PgPool, session_id: i64) -> Result<(), AppError> {
        let student_id = {
            let active = self.active.lock().unwrap();
            active
                .iter()
                .find(|(_, s)| **s == session_id)
                .map(|(student, _)| *student)
        };

        if let Some(student_id) = student_id {
            self.active.lock().unwrap().remove(&student_id);
        }

        sqlx::query(
            "UPDATE monitoring_sessions SET ended_at = NOW() WHERE session_id = $1 AND ended_at IS NULL",
        )
        .bind(session_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Records one activity capture for later analysis. The insert is scoped
    /// to the student's own monitoring window, so a caller cannot feed events
    /// into someone else's session.
    pub async fn record_event(
        &self,
        pool: &PgPool,
        session_id: i64,
        student_id: i64,
        event_type: &str,
        active_window: &str,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO monitoring_events (monitoring_id, event_type, active_window)
            SELECT id, $3, $4 FROM monitoring_sessions
            WHERE session_id = $1 AND student_id = $2 AND ended_at IS NULL
            "#,
        )
        .bind(session_id)
        .bind(student_id)
        .bind(event_type)
        .bind(active_window)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Monitoring session not found".to_string()));
        }

        Ok(())
    }

    /// Runs the configured strategy over the session's events and persists
    /// the verdict.
    pub async fn analyze_session(
        &self,
        pool: &PgPool,
        session_id: i64,
    ) -> Result<Analysis, AppError> {
        let events: Vec<MonitoringEvent> = sqlx::query_as(
            r#"
            SELECT e.event_type, e.active_window, e.created_at
            FROM monitoring_events e
            JOIN monitoring_sessions m ON e.monitoring_id = m.id
            WHERE m.session_id = $1
            ORDER BY e.created_at
            "#,
        )
        .bind(session_id)
        .fetch_all(pool)
        .await?;

        let analysis = self.strategy.analyze(&events).await;

        sqlx::query(
            "UPDATE monitoring_sessions SET suspicious = $2, analysis = $3 WHERE session_id = $1",
        )
        .bind(session_id)
        .bind(analysis.suspicious)
        .bind(json!(analysis))
        .execute(pool)
        .await?;

        Ok(analysis)
    }

    /// True while the student has a live monitored session.
    pub fn is_monitored(&self, student_id: i64) -> bool {
        self.active.lock().unwrap().contains_key(&student_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn event(offset_ms: i64, window: &str) -> MonitoringEvent {
        MonitoringEvent {
            event_type: "screenshot".to_string(),
            active_window: window.to_string(),
            created_at: Utc::now() + Duration::milliseconds(offset_ms),
        }
    }

    #[tokio::test]
    async fn calm_session_is_not_suspicious() {
        let events = vec![
            event(0, "exam"),
            event(5000, "exam"),
            event(10000, "exam"),
        ];
        let analysis = PatternHeuristic.analyze(&events).await;
        assert!(!analysis.suspicious);
        assert!(analysis.patterns.is_empty());
    }

    #[tokio::test]
    async fn rapid_window_switching_is_suspicious() {
        // Each adjacent pair triggers both QUICK_CHANGE and WINDOW_CHANGE.
        let events = vec![
            event(0, "exam"),
            event(100, "browser"),
            event(200, "exam"),
        ];
        let analysis = PatternHeuristic.analyze(&events).await;
        assert_eq!(analysis.patterns.len(), 4);
        assert!(analysis.suspicious);
    }

    #[tokio::test]
    async fn empty_session_yields_empty_analysis() {
        let analysis = PatternHeuristic.analyze(&[]).await;
        assert!(!analysis.suspicious);
        assert!(analysis.patterns.is_empty());
    }
}
