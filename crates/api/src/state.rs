//! Shared application state

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    auth::{ChallengeStore, JwtManager},
    config::Config,
    oidc::OidcClient,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub jwt: JwtManager,
    /// Pending MFA login challenges; in-memory, lost on restart
    pub challenges: Arc<ChallengeStore>,
    /// Present only when OIDC provider settings are configured
    pub oidc: Option<OidcClient>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let jwt = JwtManager::new(
            &config.jwt_secret,
            config.access_token_expire_minutes,
            config.refresh_token_expire_minutes,
        );
        let oidc = config.oidc.clone().map(OidcClient::new);

        Self {
            pool,
            config: Arc::new(config),
            jwt,
            challenges: Arc::new(ChallengeStore::new()),
            oidc,
        }
    }
}
