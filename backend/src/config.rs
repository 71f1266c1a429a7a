use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host (default: 0.0.0.0)
    pub host: String,
    /// Server port (default: 8080)
    pub port: u16,
    /// Google OAuth client ID the ID tokens must be issued for
    pub google_client_id: String,
    /// Issuer base URL used for JWKS discovery (default: https://accounts.google.com)
    pub google_issuer: String,
    /// Secret for signing session tokens
    pub session_secret: String,
    /// SQLite database URL
    pub database_url: String,
    /// Base URL of the downstream agent service
    pub agent_base_url: String,
    /// Timeout for agent invocations, in seconds (default: 60)
    pub agent_timeout_secs: u64,
    /// Queries each user may spend per UTC day (default: 3)
    pub daily_query_limit: u32,
    /// Per-IP requests per minute on sensitive endpoints (default: 10)
    pub rate_limit_per_minute: u32,
    /// Log level (default: info)
    pub log_level: String,
    /// CORS allowed origins (comma-separated, default: *)
    pub cors_origins: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidNumber("PORT"))?,
            google_client_id: env::var("GOOGLE_CLIENT_ID")
                .map_err(|_| ConfigError::MissingEnvVar("GOOGLE_CLIENT_ID"))?,
            google_issuer: env::var("GOOGLE_ISSUER")
                .unwrap_or_else(|_| "https://accounts.google.com".to_string()),
            session_secret: env::var("JWT_SECRET")
                .map_err(|_| ConfigError::MissingEnvVar("JWT_SECRET"))?,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./data/agentgate.db".to_string()),
            agent_base_url: env::var("AGENT_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8001".to_string()),
            agent_timeout_secs: env::var("AGENT_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidNumber("AGENT_TIMEOUT_SECS"))?,
            daily_query_limit: env::var("DAILY_QUERY_LIMIT")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidNumber("DAILY_QUERY_LIMIT"))?,
            rate_limit_per_minute: env::var("RATE_LIMIT_PER_MINUTE")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidNumber("RATE_LIMIT_PER_MINUTE"))?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            cors_origins: env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string()),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    #[error("Invalid numeric value for {0}")]
    InvalidNumber(&'static str),
}
