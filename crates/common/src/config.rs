use std::path::PathBuf;

use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Port the API server binds to (default: 3000)
    pub api_port: u16,

    /// JWT secret for contestant authentication
    pub jwt_secret: String,

    /// JWT token expiry in hours
    pub jwt_expiry_hours: u64,

    /// Shared bearer token for the internal event-ingest routes
    pub internal_api_token: String,

    /// PEM file holding the VAPID P-256 private key
    pub vapid_private_key_path: PathBuf,

    /// VAPID `sub` claim (a `mailto:` or `https:` contact URI)
    pub webpush_subject: String,

    /// Upper bound for a single push delivery request, in milliseconds
    pub webpush_timeout_ms: u64,

    /// How long the push service should hold an undelivered message, in seconds
    pub webpush_ttl_seconds: u32,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("API_PORT must be a valid u16"))?,
            jwt_secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?,
            jwt_expiry_hours: std::env::var("JWT_EXPIRY_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("JWT_EXPIRY_HOURS must be a valid u64"))?,
            internal_api_token: std::env::var("INTERNAL_API_TOKEN").map_err(|_| {
                anyhow::anyhow!("INTERNAL_API_TOKEN environment variable is required")
            })?,
            vapid_private_key_path: std::env::var("VAPID_PRIVATE_KEY_PATH")
                .unwrap_or_else(|_| "../vapid_private.pem".to_string())
                .into(),
            webpush_subject: std::env::var("WEBPUSH_SUBJECT")
                .unwrap_or_else(|_| "mailto:xsuportal@example.com".to_string()),
            webpush_timeout_ms: std::env::var("WEBPUSH_TIMEOUT_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("WEBPUSH_TIMEOUT_MS must be a valid u64"))?,
            webpush_ttl_seconds: std::env::var("WEBPUSH_TTL_SECONDS")
                .unwrap_or_else(|_| "86400".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("WEBPUSH_TTL_SECONDS must be a valid u32"))?,
        })
    }
}
