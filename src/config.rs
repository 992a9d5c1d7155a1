use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";

/// Pesapal gateway settings. Credentials are optional at load time so a
/// storefront without payments still boots; checkout surfaces a distinct
/// `ServiceError::Configuration` when they are missing.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PesapalConfig {
    /// Provider base URL, e.g. "https://cybqa.pesapal.com/pesapalv3"
    #[serde(default = "default_pesapal_api_url")]
    pub api_url: String,

    pub consumer_key: Option<String>,
    pub consumer_secret: Option<String>,

    /// Where the provider redirects the buyer after payment
    #[serde(default)]
    pub callback_url: String,

    #[serde(default = "default_currency")]
    pub currency: String,

    /// Outbound request timeout in seconds
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PesapalConfig {
    fn default() -> Self {
        Self {
            api_url: default_pesapal_api_url(),
            consumer_key: None,
            consumer_secret: None,
            callback_url: String::new(),
            currency: default_currency(),
            timeout_secs: default_gateway_timeout_secs(),
        }
    }
}

/// SMTP settings for ticket delivery. Entirely optional; when absent the
/// mailer is disabled and confirmed orders are only logged.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SmtpConfig {
    pub server: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[validate(email)]
    pub from_email: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

/// Application configuration with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Public base URL used in ticket verification links and QR codes
    #[serde(default = "default_site_url")]
    #[validate(length(min = 1))]
    pub site_url: String,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB connect timeout (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    #[serde(default)]
    #[validate]
    pub pesapal: PesapalConfig,

    #[serde(default)]
    #[validate]
    pub smtp: Option<SmtpConfig>,
}

fn default_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_site_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    10
}
fn default_pesapal_api_url() -> String {
    "https://pay.pesapal.com/v3".to_string()
}
fn default_currency() -> String {
    "KES".to_string()
}
fn default_gateway_timeout_secs() -> u64 {
    15
}
fn default_smtp_port() -> u16 {
    587
}
fn default_from_name() -> String {
    "Comicstand".to_string()
}

impl AppConfig {
    pub fn is_development(&self) -> bool {
        self.environment == "development" || self.environment == "test"
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Loads application configuration.
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://comicstand.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", 8080_i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    Ok(app_config)
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("comicstand_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".into(),
            host: "127.0.0.1".into(),
            port: 8080,
            environment: "test".into(),
            log_level: "debug".into(),
            log_json: false,
            auto_migrate: true,
            site_url: "http://localhost:8080".into(),
            cors_allowed_origins: None,
            db_max_connections: 1,
            db_min_connections: 1,
            db_connect_timeout_secs: 5,
            pesapal: PesapalConfig::default(),
            smtp: None,
        }
    }

    #[test]
    fn default_pesapal_config_has_no_credentials() {
        let cfg = base_config();
        assert!(cfg.pesapal.consumer_key.is_none());
        assert!(cfg.pesapal.consumer_secret.is_none());
        assert_eq!(cfg.pesapal.currency, "KES");
        assert_eq!(cfg.pesapal.timeout_secs, 15);
    }

    #[test]
    fn validation_rejects_bad_smtp_from_address() {
        let mut cfg = base_config();
        cfg.smtp = Some(SmtpConfig {
            server: "smtp.example.com".into(),
            port: 587,
            username: "user".into(),
            password: "pass".into(),
            from_email: "not-an-email".into(),
            from_name: "Comicstand".into(),
        });
        assert!(cfg.validate().is_err());
    }
}
