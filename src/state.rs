//! Shared handles injected into every handler.

use std::sync::Arc;

use crate::auth::JwtKeys;
use crate::config::AppConfig;
use crate::rate_limit::RateLimiter;
use crate::services::{DynAssets, Mailer};
use crate::store::DynStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: DynStore,
    pub jwt: Arc<JwtKeys>,
    pub limiter: RateLimiter,
    pub assets: DynAssets,
    pub mailer: Arc<dyn Mailer>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: DynStore,
        limiter: RateLimiter,
        assets: DynAssets,
        mailer: Arc<dyn Mailer>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            jwt: Arc::new(JwtKeys::new(&config.jwt)),
            config: Arc::new(config),
            store,
            limiter,
            assets,
            mailer,
            http,
        }
    }

    /// Send without failing the caller; delivery errors are only logged.
    pub fn send_in_background(&self, email: crate::services::Email) {
        let mailer = self.mailer.clone();
        tokio::spawn(async move {
            let to = email.to.clone();
            if let Err(e) = mailer.send(email).await {
                tracing::warn!(to = %to, error = %e, "email delivery failed");
            }
        });
    }

    /// In-memory store and counters, a recording mailer and a throwaway upload dir.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        use crate::config::Environment;
        use crate::rate_limit::MemoryRateLimitStore;
        use crate::services::{assets::LocalDiskStorage, mailer::LogMailer};
        use crate::store::MemoryStore;

        let mut config = AppConfig {
            environment: Environment::Test,
            bcrypt_cost: 4,
            ..AppConfig::default()
        };
        config.upload.dir =
            std::env::temp_dir().join(format!("portfolio-cms-test-{}", uuid::Uuid::new_v4()));

        let limiter = RateLimiter::new(Arc::new(MemoryRateLimitStore::new()), &config.rate_limit);
        let assets = Arc::new(LocalDiskStorage::new(config.upload.dir.clone()));
        Self::new(
            config,
            Arc::new(MemoryStore::new()),
            limiter,
            assets,
            Arc::new(LogMailer::new()),
            reqwest::Client::new(),
        )
    }
}
