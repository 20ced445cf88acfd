//! Application state
//!
//! Explicitly constructed shared state threaded through every handler.
//! There is no process-wide database singleton: the pool is built in main
//! and carried here.

use std::sync::Arc;

use sqlx::PgPool;

use crate::auth::JwtKeys;
use crate::config::Config;
use crate::metrics::Metrics;
use crate::notify::OtpGateway;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub jwt: Arc<JwtKeys>,
    pub otp_gateway: Arc<dyn OtpGateway>,
    pub metrics: Arc<Metrics>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let jwt = Arc::new(JwtKeys::from_secret(&config.jwt_secret));
        let otp_gateway = crate::notify::from_config(&config);

        Self {
            pool,
            config: Arc::new(config),
            jwt,
            otp_gateway,
            metrics: Arc::new(Metrics::new()),
            http: reqwest::Client::new(),
        }
    }
}
