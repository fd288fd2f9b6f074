// src/config.rs

use dotenvy::dotenv;
use std::env;

/// Consecutive failed logins tolerated before an email is locked out.
pub const MAX_LOGIN_ATTEMPTS: u32 = 5;

/// Lockout window in seconds (30 minutes).
pub const LOCKOUT_DURATION_SECS: u64 = 30 * 60;

/// Default credential assigned to newly enrolled students.
/// They must change it before accessing anything else.
pub const DEFAULT_STUDENT_PASSWORD: &str = "Student123!";

/// Default TTL for cached responses, in seconds.
pub const CACHE_TTL_SECS: u64 = 3600;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_refresh_secret: String,
    pub jwt_expiration: u64,
    pub jwt_refresh_expiration: u64,
    pub cors_origin: String,
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_password: Option<String>,
    pub support_contact: String,
    pub rust_log: String,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let jwt_refresh_secret =
            env::var("JWT_REFRESH_SECRET").expect("JWT_REFRESH_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRES_IN")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3600);

        let jwt_refresh_expiration = env::var("JWT_REFRESH_EXPIRES_IN")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(7 * 24 * 3600);

        let cors_origin =
            env::var("CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string());

        let redis_host = env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string());

        let redis_port = env::var("REDIS_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(6379);

        let redis_password = env::var("REDIS_PASSWORD").ok();

        let support_contact = env::var("SUPPORT_CONTACT").unwrap_or_default();

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Self {
            database_url,
            jwt_secret,
            jwt_refresh_secret,
            jwt_expiration,
            jwt_refresh_expiration,
            cors_origin,
            redis_host,
            redis_port,
            redis_password,
            support_contact,
            rust_log,
            admin_email: env::var("ADMIN_EMAIL").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
        }
    }

    pub fn redis_url(&self) -> String {
        match &self.redis_password {
            Some(password) => {
                format!("redis://:{}@{}:{}", password, self.redis_host, self.redis_port)
            }
            None => format!("redis://{}:{}", self.redis_host, self.redis_port),
        }
    }
}
