use std::net::IpAddr;
use std::time::Duration;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub host: IpAddr,
    pub port: u16,
    pub cors_origin: Option<String>,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env_required("DATABASE_URL")?;
        let jwt_secret = env_required("JWT_SECRET")?;

        if jwt_secret.len() < 16 {
            return Err("JWT_SECRET must be at least 16 characters".to_string());
        }

        let host: IpAddr = env_or("TEAMTRACK_HOST", "0.0.0.0")
            .parse()
            .map_err(|e| format!("Invalid TEAMTRACK_HOST: {e}"))?;

        let port: u16 = env_or("TEAMTRACK_PORT", "3000")
            .parse()
            .map_err(|e| format!("Invalid TEAMTRACK_PORT: {e}"))?;

        let cors_origin = std::env::var("TEAMTRACK_CORS_ORIGIN")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let log_level = env_or("TEAMTRACK_LOG_LEVEL", "info");

        Ok(Config {
            database_url,
            jwt_secret,
            host,
            port,
            cors_origin,
            log_level,
        })
    }
}

/// Tracker core configuration, used by API clients.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    /// Delay before re-resolving the profile after an auth change event.
    pub auth_debounce: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:3000".to_string(),
            auth_debounce: Duration::from_millis(100),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, String> {
        let api_url = env_or("TEAMTRACK_API_URL", "http://127.0.0.1:3000")
            .trim_end_matches('/')
            .to_string();

        let debounce_ms: u64 = env_or("TEAMTRACK_AUTH_DEBOUNCE_MS", "100")
            .parse()
            .map_err(|e| format!("Invalid TEAMTRACK_AUTH_DEBOUNCE_MS: {e}"))?;

        Ok(ClientConfig {
            api_url,
            auth_debounce: Duration::from_millis(debounce_ms),
        })
    }
}

fn env_required(key: &str) -> Result<String, String> {
    std::env::var(key).map_err(|_| format!("Missing required environment variable: {key}"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
