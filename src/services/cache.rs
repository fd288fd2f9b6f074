// src/services/cache.rs
//
// Pass-through response cache over Redis. Never correctness-critical: any
// error degrades to a miss and the caller falls through to a live computation.

use std::sync::Arc;

use redis::aio::ConnectionManager;
use redis::{Client, RedisError, cmd};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;

const PREFIX: &str = "exam:";

#[derive(Clone)]
pub struct CacheService {
    url: String,
    manager: Arc<RwLock<Option<ConnectionManager>>>,
}

impl CacheService {
    pub fn new(url: String) -> Self {
        Self {
            url,
            manager: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn connect(&self) -> Result<(), RedisError> {
        let client = Client::open(self.url.clone())?;
        let manager = ConnectionManager::new(client).await?;
        let mut guard = self.manager.write().await;
        *guard = Some(manager);
        Ok(())
    }

    async fn connection(&self) -> Option<ConnectionManager> {
        self.manager.read().await.clone()
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut manager = self.connection().await?;

        let raw = cmd("GET")
            .arg(format!("{PREFIX}{key}"))
            .query_async::<_, Option<String>>(&mut manager)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Cache get error for {}: {}", key, e);
                None
            });

        raw.and_then(|value| serde_json::from_str(&value).ok())
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_seconds: u64) {
        let Some(mut manager) = self.connection().await else {
            return;
        };

        let Ok(json) = serde_json::to_string(value) else {
            return;
        };

        let result = cmd("SET")
            .arg(format!("{PREFIX}{key}"))
            .arg(json)
            .arg("EX")
            .arg(ttl_seconds)
            .query_async::<_, ()>(&mut manager)
            .await;

        if let Err(e) = result {
            tracing::warn!("Cache set error for {}: {}", key, e);
        }
    }

    pub async fn del(&self, key: &str) {
        let Some(mut manager) = self.connection().await else {
            return;
        };

        let result = cmd("DEL")
            .arg(format!("{PREFIX}{key}"))
            .query_async::<_, ()>(&mut manager)
            .await;

        if let Err(e) = result {
            tracing::warn!("Cache delete error for {}: {}", key, e);
        }
    }

    /// Drops every key in the namespace. Used by the manual flush endpoint.
    pub async fn flush(&self) {
        let Some(mut manager) = self.connection().await else {
            return;
        };

        let keys = cmd("KEYS")
            .arg(format!("{PREFIX}*"))
            .query_async::<_, Vec<String>>(&mut manager)
            .await
            .unwrap_or_default();

        if keys.is_empty() {
            return;
        }

        let mut del = cmd("DEL");
        for key in &keys {
            del.arg(key);
        }
        let result = del.query_async::<_, ()>(&mut manager).await;

        if let Err(e) = result {
            tracing::warn!("Cache flush error: {}", e);
        }
    }
}

/// Cache key for a question listing, invalidated by mutating endpoints.
pub fn questions_key(subject_id: &str, subcategory_id: &str) -> String {
    format!("questions:{subject_id}:{subcategory_id}")
}

/// Cache key for a student/question performance analysis.
pub fn performance_key(student_id: i64, question_id: i64) -> String {
    format!("performance:{student_id}:{question_id}")
}
