//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Application configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the hosted backend (REST + auth live under it).
    pub backend_url: String,
    /// Public (anon) API key sent with every backend request.
    pub anon_key: SecretString,
    /// Port for the HTTP/WebSocket surface.
    pub http_port: u16,
    /// Per-request timeout against the backend.
    pub request_timeout: Duration,
    /// How often the live-message poller asks for new rows.
    pub poll_interval: Duration,
    /// How many times a closed message subscription is re-armed before giving up.
    pub resubscribe_attempts: u32,
    /// Operator credentials used to establish the session at startup.
    pub operator_email: Option<String>,
    pub operator_password: Option<SecretString>,
}

impl AppConfig {
    /// Build a config from `CAREOPS_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend_url = std::env::var("CAREOPS_BACKEND_URL")
            .map_err(|_| ConfigError::MissingEnvVar("CAREOPS_BACKEND_URL".into()))?;
        let anon_key = std::env::var("CAREOPS_ANON_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("CAREOPS_ANON_KEY".into()))?;

        Ok(Self {
            backend_url: backend_url.trim_end_matches('/').to_string(),
            anon_key: SecretString::from(anon_key),
            http_port: parse_var("CAREOPS_HTTP_PORT", 8080)?,
            request_timeout: Duration::from_secs(parse_var("CAREOPS_REQUEST_TIMEOUT_SECS", 15)?),
            poll_interval: Duration::from_millis(parse_var("CAREOPS_POLL_INTERVAL_MS", 2000)?),
            resubscribe_attempts: parse_var("CAREOPS_RESUBSCRIBE_ATTEMPTS", 3)?,
            operator_email: std::env::var("CAREOPS_EMAIL").ok(),
            operator_password: std::env::var("CAREOPS_PASSWORD").ok().map(SecretString::from),
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:54321".to_string(),
            anon_key: SecretString::from(String::new()),
            http_port: 8080,
            request_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_millis(2000),
            resubscribe_attempts: 3,
            operator_email: None,
            operator_password: None,
        }
    }
}

/// Parse an optional numeric variable, falling back to `default` when unset.
fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?} is not a valid number"),
        }),
        Err(_) => Ok(default),
    }
}
