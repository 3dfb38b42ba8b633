use crate::error::{DropError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub access: AccessConfig,
    pub payments: PaymentsConfig,
    pub email: EmailConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Public URL of the frontend, used in emails and checkout redirects.
    pub base_url: String,
    pub max_upload_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            base_url: "http://localhost:3000".to_string(),
            max_upload_bytes: 1024 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root for uploaded objects and the webhook ledger.
    pub data_dir: PathBuf,
    /// Use the libSQL database instead of in-memory storage (`db` feature).
    pub use_database: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            use_database: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `libsql://` / `https://` for a hosted database, or a local file path.
    pub url: Option<String>,
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Upper bound on a session for drops without a hard deadline.
    pub session_ttl_minutes: i64,
    /// Zero disables the background expiry sweep.
    pub sweep_interval_secs: u64,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            session_ttl_minutes: 24 * 60,
            sweep_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaymentsConfig {
    pub api_base: String,
    pub secret_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub webhook_tolerance_secs: i64,
    pub price_individual: Option<String>,
    pub price_business: Option<String>,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.stripe.com".to_string(),
            secret_key: None,
            webhook_secret: None,
            webhook_tolerance_secs: 300,
            price_individual: None,
            price_business: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub from: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.resend.com".to_string(),
            api_key: None,
            from: "DropAccess <noreply@dropaccess.app>".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub listen_addr: Option<String>,
}

impl AppConfig {
    /// Loads `path` (or `config.toml` when absent), then applies environment overrides.
    ///
    /// A missing default file is fine; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            DropError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Overrides fields from environment variables (already loaded from `.env` by the binary).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("DROPACCESS_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| DropError::Config(format!("DROPACCESS_PORT is not a port: {port}")))?;
        }
        if let Some(dir) = lookup("DROPACCESS_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup("APP_BASE_URL") {
            self.server.base_url = url;
        }
        if let Some(url) = lookup("LIBSQL_URL") {
            self.database.url = Some(url);
        }
        if let Some(token) = lookup("LIBSQL_AUTH_TOKEN") {
            self.database.auth_token = Some(token);
        }
        if let Some(key) = lookup("PAYMENTS_SECRET_KEY") {
            self.payments.secret_key = Some(key);
        }
        if let Some(secret) = lookup("PAYMENTS_WEBHOOK_SECRET") {
            self.payments.webhook_secret = Some(secret);
        }
        if let Some(key) = lookup("EMAIL_API_KEY") {
            self.email.api_key = Some(key);
        }
        if let Some(from) = lookup("EMAIL_FROM") {
            self.email.from = from;
        }
        if let Some(addr) = lookup("METRICS_ADDR") {
            self.metrics.listen_addr = Some(addr);
        }
        Ok(())
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.storage.data_dir.join("ledger").join("webhooks.db")
    }

    pub fn objects_root(&self) -> PathBuf {
        self.storage.data_dir.join("objects")
    }
}
