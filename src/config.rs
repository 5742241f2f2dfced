//! Environment-driven configuration for the gateway process.

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub websocket_port: u16,
    pub dsn_host_port: String,
    pub rf_url: String,
    pub auth_field_name: String,
    pub rf_skip_tls: bool,
    pub enable_metrics: bool,
}

impl Config {
    /// Reads configuration from the environment. `DSN_HOST_PORT` and `RF_URL`
    /// have no sane default and must be set.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "debug".to_string()),
            websocket_port: std::env::var("WS_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8089),
            dsn_host_port: std::env::var("DSN_HOST_PORT")
                .context("DSN_HOST_PORT must be set (host:port of the device-status network)")?,
            rf_url: std::env::var("RF_URL")
                .context("RF_URL must be set (base URL of the right-verifier)")?,
            auth_field_name: std::env::var("AUTH_FIELD_NAME")
                .unwrap_or_else(|_| "auth_result".to_string()),
            rf_skip_tls: env_bool("RF_SKIP_TLS", false),
            enable_metrics: env_bool("ENABLE_METRICS", false),
        })
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"),
        Err(_) => default,
    }
}
