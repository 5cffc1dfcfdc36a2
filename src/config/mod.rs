//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text
    pub log_json: bool,

    /// HS256 signing secret for access and challenge tokens
    pub jwt_secret: String,
    /// `iss` claim stamped on and required from every token
    pub jwt_issuer: String,
    /// Access token lifetime in minutes
    pub jwt_ttl_minutes: u64,
    /// Issuer label shown in authenticator apps
    pub totp_issuer: String,

    /// Supabase connection, when persistence is remote
    pub supabase: Option<SupabaseConfig>,

    /// Allowed client origins for CORS (comma-separated)
    pub client_origin: String,
}

/// Supabase (PostgREST) connection settings
#[derive(Clone, Debug)]
pub struct SupabaseConfig {
    /// Supabase project URL
    pub url: String,
    /// Service role key (bypasses RLS - server only!)
    pub service_role_key: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let jwt_ttl_minutes = match env::var("JWT_TTL_MINUTES") {
            Ok(v) => v
                .parse::<u64>()
                .map_err(|_| ConfigError::Invalid("JWT_TTL_MINUTES"))?,
            Err(_) => 60,
        };

        let supabase = match (env::var("SUPABASE_URL"), env::var("SUPABASE_SERVICE_ROLE_KEY")) {
            (Ok(url), Ok(service_role_key)) => Some(SupabaseConfig {
                url: url.trim_end_matches('/').to_string(),
                service_role_key,
            }),
            (Ok(_), Err(_)) => return Err(ConfigError::Missing("SUPABASE_SERVICE_ROLE_KEY")),
            _ => None,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_json: env::var("LOG_FORMAT")
                .map(|f| f.eq_ignore_ascii_case("json"))
                .unwrap_or(false),

            jwt_secret: env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?,
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "pong-arena".to_string()),
            jwt_ttl_minutes,
            totp_issuer: env::var("TOTP_ISSUER").unwrap_or_else(|_| "Pong Arena".to_string()),

            supabase,

            client_origin: env::var("CLIENT_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
        })
    }

    /// Configuration for unit tests: in-memory store, fixed secret
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            server_addr: "127.0.0.1:0".parse().expect("static addr"),
            log_level: "debug".to_string(),
            log_json: false,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "pong-arena-test".to_string(),
            jwt_ttl_minutes: 5,
            totp_issuer: "Pong Arena".to_string(),
            supabase: None,
            client_origin: "http://localhost:3000".to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
