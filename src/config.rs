use std::env;

use crate::error::{Result, SyncError};

/// Process-wide configuration for the sync engine, loaded from the
/// environment (with an optional `.env` file) the same way the credential
/// store and server settings are loaded by the external GUI shell.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_url: String,
    pub username: String,
    pub password: String,
    pub state_db_path: String,
    pub http_timeout_seconds: u64,
    pub max_concurrency: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::info!("loaded environment from {}", path.display()),
            Err(_) => tracing::debug!("no .env file found, using process environment"),
        }

        let server_url = env::var("NC_SERVER_URL")
            .map_err(|_| SyncError::Config("NC_SERVER_URL is not set".into()))?;
        let username = env::var("NC_USERNAME")
            .map_err(|_| SyncError::Config("NC_USERNAME is not set".into()))?;
        let password = env::var("NC_PASSWORD")
            .map_err(|_| SyncError::Config("NC_PASSWORD is not set".into()))?;

        let state_db_path =
            env::var("NC_STATE_DB_PATH").unwrap_or_else(|_| default_state_db_path());

        let http_timeout_seconds = env::var("NC_HTTP_TIMEOUT_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let max_concurrency = env::var("NC_MAX_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        tracing::info!(
            server_url = %server_url,
            username = %username,
            state_db_path = %state_db_path,
            "configuration loaded"
        );

        Ok(Self {
            server_url,
            username,
            password,
            state_db_path,
            http_timeout_seconds,
            max_concurrency,
        })
    }
}

fn default_state_db_path() -> String {
    format!("{}/nextcloud-dav-sync.db", documents_dir())
}

/// Minimal stand-in for an OS "app documents" directory lookup: prefers
/// `$HOME`, falls back to the current directory. The GUI shell owns the
/// real platform-specific path; the engine only needs a writable default.
fn documents_dir() -> String {
    env::var("HOME").unwrap_or_else(|_| ".".to_string())
}

/// Injected credential accessor, mirroring an external credential-store
/// contract. The CLI's default implementation reads [`AppConfig`]; an
/// embedding GUI shell supplies its own.
pub trait CredentialSource: Send + Sync {
    fn username(&self) -> String;
    fn password(&self) -> String;
    fn base_url(&self) -> String;
}

impl CredentialSource for AppConfig {
    fn username(&self) -> String {
        self.username.clone()
    }

    fn password(&self) -> String {
        self.password.clone()
    }

    fn base_url(&self) -> String {
        self.server_url.clone()
    }
}
