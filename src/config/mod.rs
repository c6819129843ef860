//! Configuration management
//!
//! Configuration is assembled from three layers, lowest precedence first:
//! - built-in defaults
//! - `config.yml`
//! - environment variables (a `.env` file is loaded into the environment first)
//!
//! `SECRET_KEY`, `ALLOWED_HOSTS` and `DATABASE_URL` have no defaults and are
//! enforced by [`Config::validate`].

mod secret;

pub use secret::{validate_secret, ProtectedSecret, SecretError, MIN_SECRET_LENGTH};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Development mode. Production middleware is active when this is false.
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL. The driver is derived from its scheme.
    #[serde(default)]
    pub url: String,
    /// Log every SQL statement
    #[serde(default)]
    pub echo: bool,
    /// Persistent pool size
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// Extra connections allowed beyond `pool_size`
    #[serde(default = "default_max_overflow")]
    pub max_overflow: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
    /// Connections older than this are recycled
    #[serde(default = "default_max_lifetime")]
    pub max_lifetime_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            echo: false,
            pool_size: default_pool_size(),
            max_overflow: default_max_overflow(),
            acquire_timeout_seconds: default_acquire_timeout(),
            max_lifetime_seconds: default_max_lifetime(),
        }
    }
}

fn default_pool_size() -> u32 {
    15
}

fn default_max_overflow() -> u32 {
    5
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_max_lifetime() -> u64 {
    1800
}

impl DatabaseConfig {
    /// Config for a database URL with default pool settings.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Resolve the driver from the URL scheme.
    pub fn driver(&self) -> Result<DatabaseDriver, ConfigError> {
        DatabaseDriver::from_url(&self.url)
    }

    /// Upper bound on open connections.
    pub fn max_connections(&self) -> u32 {
        (self.pool_size + self.max_overflow).max(1)
    }
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    Sqlite,
    Postgres,
}

impl DatabaseDriver {
    /// `sqlite…` and `:memory:` select SQLite, `postgres…` selects PostgreSQL.
    pub fn from_url(url: &str) -> Result<Self, ConfigError> {
        let url = url.trim();
        if url.starts_with("sqlite") || url == ":memory:" {
            Ok(Self::Sqlite)
        } else if url.starts_with("postgres") {
            Ok(Self::Postgres)
        } else {
            Err(ConfigError::UnsupportedDatabase(url.to_string()))
        }
    }
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub secret_key: Option<ProtectedSecret>,
    /// Hosts accepted by the trusted-host check. `*` and `*.example.com` are allowed.
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
    #[serde(default = "default_session_max_age_days")]
    pub session_max_age_days: i64,
    /// Redirect plain HTTP to HTTPS in production
    #[serde(default = "default_true")]
    pub https_redirect: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            allowed_hosts: Vec::new(),
            session_max_age_days: default_session_max_age_days(),
            https_redirect: true,
        }
    }
}

fn default_session_max_age_days() -> i64 {
    7
}

fn default_true() -> bool {
    true
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Rotated daily. `None` disables the file sink.
    #[serde(default = "default_log_file")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("logs/app.log"))
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory whose templates override the embedded ones
    #[serde(default)]
    pub templates: Option<PathBuf>,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            templates: None,
            static_dir: default_static_dir(),
        }
    }
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("'{0}'\nPlease ensure you have set up the environment variables or created an .env file.")]
    MissingConfiguration(String),
    #[error("Invalid SECRET_KEY: {0}")]
    InvalidSecret(#[from] SecretError),
    #[error("Unsupported database URL: {0}")]
    UnsupportedDatabase(String),
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file.
    ///
    /// A missing or empty file yields defaults. Invalid YAML is reported with
    /// its location.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: format_yaml_error(&e),
        })
    }

    /// Load configuration from file, then apply environment overrides.
    ///
    /// Recognised variables: `SECRET_KEY`, `ALLOWED_HOSTS`, `DEBUG`,
    /// `DB_ECHO`, `LOG_FILE`, `LOG_LEVEL`, `DATABASE_URL`, `HOST`, `PORT`.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Unparseable booleans and ports are ignored. A weak `SECRET_KEY` is an error.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(secret) = env_value("SECRET_KEY") {
            self.security.secret_key = Some(ProtectedSecret::new(secret)?);
        }
        if let Some(hosts) = env_value("ALLOWED_HOSTS") {
            self.security.allowed_hosts = parse_host_list(&hosts);
        }
        if let Some(debug) = env_value("DEBUG").as_deref().and_then(parse_bool) {
            self.debug = debug;
        }
        if let Some(echo) = env_value("DB_ECHO").as_deref().and_then(parse_bool) {
            self.database.echo = echo;
        }
        if let Some(file) = env_value("LOG_FILE") {
            self.logging.file = Some(PathBuf::from(file));
        }
        if let Some(level) = env_value("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(url) = env_value("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(host) = env_value("HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_value("PORT").and_then(|p| p.parse::<u16>().ok()) {
            self.server.port = port;
        }
        Ok(())
    }

    /// Check that every required setting is present and usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.secret_key.is_none() {
            return Err(ConfigError::MissingConfiguration("SECRET_KEY".into()));
        }
        if self.security.allowed_hosts.is_empty() {
            return Err(ConfigError::MissingConfiguration("ALLOWED_HOSTS".into()));
        }
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::MissingConfiguration("DATABASE_URL".into()));
        }
        self.database.driver()?;
        if self.security.session_max_age_days <= 0 {
            return Err(ConfigError::ValidationError(
                "security.session_max_age_days must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Production mode enables CSRF, trusted hosts, HTTPS redirect and CORS.
    pub fn is_production(&self) -> bool {
        !self.debug
    }

    /// Socket address string for the listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Split a comma separated host list, dropping empty entries.
pub fn parse_host_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by every test that touches process environment variables.
#[cfg(test)]
pub(crate) static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
