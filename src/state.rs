use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::config::Config;
use crate::services::anti_cheat::AntiCheat;
use crate::services::cache::CacheService;
use crate::services::notifier::Notifier;
use crate::services::recommend::Recommender;
use crate::services::security::{LoginGuard, TokenBlocklist};

/// All process-wide state, owned here and injected into handlers.
/// Nothing reaches these registries through ambient global lookup.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub cache: CacheService,
    pub notifier: Arc<Notifier>,
    pub anti_cheat: Arc<AntiCheat>,
    pub login_guard: Arc<LoginGuard>,
    pub blocklist: Arc<TokenBlocklist>,
    pub recommender: Arc<Recommender>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config, cache: CacheService) -> Self {
        Self {
            pool,
            config,
            cache,
            notifier: Arc::new(Notifier::default()),
            anti_cheat: Arc::new(AntiCheat::default()),
            login_guard: Arc::new(LoginGuard::default()),
            blocklist: Arc::new(TokenBlocklist::default()),
            recommender: Arc::new(Recommender::default()),
        }
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
