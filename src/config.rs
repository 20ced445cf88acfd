//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Secret used to sign access tokens (HS256)
    pub jwt_secret: String,

    /// Rate limit: requests per minute per principal
    pub rate_limit_per_minute: i32,

    /// Optional webhook used to deliver OTPs out-of-band.
    /// Absent in development: OTPs are logged instead.
    pub otp_webhook_url: Option<String>,

    /// API key for the places geocoding proxy
    pub places_api_key: Option<String>,

    /// Base URL of the places API
    pub places_base_url: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "4000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PORT"))?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) => secret,
            // Tolerated in development only
            Err(_) if environment != "production" => "dev-secret-change-me".to_string(),
            Err(_) => return Err(ConfigError::MissingEnv("JWT_SECRET")),
        };

        let rate_limit_per_minute = env::var("RATE_LIMIT_PER_MINUTE")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("RATE_LIMIT_PER_MINUTE"))?;

        let otp_webhook_url = env::var("OTP_WEBHOOK_URL").ok();
        let places_api_key = env::var("PLACES_API_KEY").ok();
        let places_base_url = env::var("PLACES_BASE_URL")
            .unwrap_or_else(|_| "https://maps.googleapis.com/maps/api/place".to_string());

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            jwt_secret,
            rate_limit_per_minute,
            otp_webhook_url,
            places_api_key,
            places_base_url,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
