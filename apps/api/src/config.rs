use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Which cloud medium privileged sessions use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudBackendKind {
    Postgres,
    Memory,
}

impl CloudBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloudBackendKind::Postgres => "postgres",
            CloudBackendKind::Memory => "memory",
        }
    }
}

impl FromStr for CloudBackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(CloudBackendKind::Postgres),
            "memory" => Ok(CloudBackendKind::Memory),
            other => bail!("CLOUD_BACKEND must be 'postgres' or 'memory', got '{other}'"),
        }
    }
}

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub privileged_email: String,
    pub cloud_backend: CloudBackendKind,
    pub database_url: Option<String>,
    pub local_store_dir: PathBuf,
    pub snapshot_timeout: Duration,
    /// Sessions untouched for this long are closed by the sweeper.
    pub session_idle_timeout: Duration,
    pub gemini_api_key: Option<String>,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let cloud_backend: CloudBackendKind = optional_env("CLOUD_BACKEND")
            .unwrap_or_else(|| "postgres".to_string())
            .parse()?;
        let database_url = match cloud_backend {
            CloudBackendKind::Postgres => Some(require_env("DATABASE_URL")?),
            CloudBackendKind::Memory => optional_env("DATABASE_URL"),
        };

        Ok(Config {
            privileged_email: require_env("PRIVILEGED_EMAIL")?,
            cloud_backend,
            database_url,
            local_store_dir: optional_env("LOCAL_STORE_DIR")
                .unwrap_or_else(|| "./data/local".to_string())
                .into(),
            snapshot_timeout: Duration::from_millis(
                optional_env("SNAPSHOT_TIMEOUT_MS")
                    .unwrap_or_else(|| "5000".to_string())
                    .parse::<u64>()
                    .context("SNAPSHOT_TIMEOUT_MS must be a number of milliseconds")?,
            ),
            session_idle_timeout: Duration::from_secs(
                optional_env("SESSION_IDLE_TIMEOUT_SECS")
                    .unwrap_or_else(|| "1800".to_string())
                    .parse::<u64>()
                    .context("SESSION_IDLE_TIMEOUT_SECS must be a number of seconds")?,
            ),
            gemini_api_key: optional_env("GEMINI_API_KEY"),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
