// src/services/recommend.rs
//
// Recommendation stubs. The "model" is a pair of fixed formulas and constant
// lists standing in for a real recommender; profiles live in memory only.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Default, Serialize)]
pub struct StudentProfile {
    /// Per-topic normalized performance in [0, 1].
    pub performance: HashMap<String, f64>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContentRecommendation {
    pub topic: &'static str,
    pub difficulty: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Badge {
    pub id: i64,
    pub name: &'static str,
    pub description: &'static str,
}

/// In-memory per-student profiles plus the hard-coded recommendation model.
#[derive(Default)]
pub struct Recommender {
    profiles: Mutex<HashMap<i64, StudentProfile>>,
}

impl Recommender {
    pub fn profile(&self, student_id: i64) -> StudentProfile {
        self.profiles
            .lock()
            .unwrap()
            .entry(student_id)
            .or_default()
            .clone()
    }

    /// Folds a new per-topic score into the profile. Scores above 0.8 mark a
    /// strength, below 0.5 a weakness.
    pub fn update_profile(&self, student_id: i64, topic: &str, score: f64) {
        let mut profiles = self.profiles.lock().unwrap();
        let profile = profiles.entry(student_id).or_default();
        profile.performance.insert(topic.to_owned(), score);

        if score > 0.8 && !profile.strengths.iter().any(|t| t == topic) {
            profile.strengths.push(topic.to_owned());
        } else if score < 0.5 && !profile.weaknesses.iter().any(|t| t == topic) {
            profile.weaknesses.push(topic.to_owned());
        }
    }

    /// Placeholder difficulty prediction from past performance.
    pub fn predict_difficulty(&self, student_id: i64, topic: &str) -> f64 {
        let performance = self
            .profile(student_id)
            .performance
            .get(topic)
            .copied()
            .unwrap_or(0.0);
        performance * 0.8 + 0.1
    }

    pub fn recommendations(&self, _student_id: i64) -> Vec<ContentRecommendation> {
        vec![
            ContentRecommendation { topic: "math", difficulty: 0.7 },
            ContentRecommendation { topic: "communication", difficulty: 0.6 },
        ]
    }

    pub fn badges(&self, _student_id: i64) -> Vec<Badge> {
        vec![
            Badge {
                id: 1,
                name: "Iniciante",
                description: "Completó el primer tema",
            },
            Badge {
                id: 2,
                name: "Experto",
                description: "Excelente rendimiento en matemáticas",
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strengths_and_weaknesses_track_scores() {
        let recommender = Recommender::default();
        recommender.update_profile(1, "algebra", 0.9);
        recommender.update_profile(1, "grammar", 0.3);

        let profile = recommender.profile(1);
        assert_eq!(profile.strengths, vec!["algebra"]);
        assert_eq!(profile.weaknesses, vec!["grammar"]);
    }

    #[test]
    fn difficulty_scales_with_performance() {
        let recommender = Recommender::default();
        assert!((recommender.predict_difficulty(1, "algebra") - 0.1).abs() < 1e-9);

        recommender.update_profile(1, "algebra", 1.0);
        assert!((recommender.predict_difficulty(1, "algebra") - 0.9).abs() < 1e-9);
    }
}
