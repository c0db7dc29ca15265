//! Configuration management for ChatNest
//!
//! Configuration comes from a TOML file or from `CHATNEST_*` environment
//! variables, on top of defaults suitable for local development.

use crate::core_chat::{InvitationPolicy, SmtpSettings, TokenSecret};
use humantime_serde::re::humantime;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub store: StoreConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Invitation signing and lifetimes
    pub invitations: InvitationConfig,

    /// Delivery of invitation tokens
    pub notifications: NotificationConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: SocketAddr,

    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Maximum pooled connections
    pub pool_size: u32,

    /// How long a writer waits for a locked database
    #[serde(with = "humantime_serde")]
    pub busy_timeout: Duration,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

/// Invitation configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvitationConfig {
    /// 32-byte token signing secret as 64 hex characters
    pub signing_secret: Option<String>,

    /// Passphrase to derive the signing secret from, if no hex secret is set
    pub signing_passphrase: Option<String>,

    /// Lifetime of an invitation when the request names none
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,

    /// Longest lifetime a request may ask for
    #[serde(with = "humantime_serde")]
    pub max_ttl: Duration,
}

/// How invitation tokens reach invitees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationTransport {
    /// Deliver nothing and warn; local development only
    #[default]
    Log,
    /// Mail the token through an SMTP relay
    Smtp,
}

impl std::str::FromStr for NotificationTransport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "log" => Ok(NotificationTransport::Log),
            "smtp" => Ok(NotificationTransport::Smtp),
            other => Err(format!("unknown transport '{}', expected log or smtp", other)),
        }
    }
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub transport: NotificationTransport,

    /// Sender address of invitation emails
    pub from_address: String,

    /// Optional sender display name
    pub from_name: Option<String>,

    /// Public base URL printed in invitation emails
    pub accept_url: Option<String>,

    pub smtp: SmtpConfig,
}

/// SMTP relay settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,

    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./data/chatnest.db"),
            pool_size: 8,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

impl Default for InvitationConfig {
    fn default() -> Self {
        let policy = InvitationPolicy::default();
        Self {
            signing_secret: None,
            signing_passphrase: None,
            default_ttl: policy.default_ttl,
            max_ttl: policy.max_ttl,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            transport: NotificationTransport::Log,
            from_address: "invitations@localhost".to_string(),
            from_name: Some("ChatNest".to_string()),
            accept_url: None,
            smtp: SmtpConfig::default(),
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 587,
            username: None,
            password: None,
            use_tls: true,
            timeout: Duration::from_secs(10),
        }
    }
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("use_tls", &self.use_tls)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl NotificationConfig {
    /// Sender mailbox as `Name <address>` or a bare address
    pub fn sender(&self) -> String {
        match &self.from_name {
            Some(name) => format!("{} <{}>", name, self.from_address),
            None => self.from_address.clone(),
        }
    }

    /// Settings for the SMTP notifier
    pub fn smtp_settings(&self) -> Result<SmtpSettings, ConfigError> {
        let host = self
            .smtp
            .host
            .clone()
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| ConfigError::invalid("notifications.smtp.host", "required for smtp transport"))?;

        Ok(SmtpSettings {
            host,
            port: self.smtp.port,
            username: self.smtp.username.clone(),
            password: self.smtp.password.clone(),
            use_tls: self.smtp.use_tls,
            timeout: self.smtp.timeout,
            from: self.sender(),
            accept_url: self.accept_url.clone(),
        })
    }
}

impl fmt::Debug for InvitationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvitationConfig")
            .field("signing_secret", &self.signing_secret.as_ref().map(|_| "<redacted>"))
            .field("signing_passphrase", &self.signing_passphrase.as_ref().map(|_| "<redacted>"))
            .field("default_ttl", &self.default_ttl)
            .field("max_ttl", &self.max_ttl)
            .finish()
    }
}

impl InvitationConfig {
    /// Whether a signing secret or passphrase is configured
    pub fn has_signing_key(&self) -> bool {
        self.signing_secret.is_some() || self.signing_passphrase.is_some()
    }

    /// Resolve the configured token signing secret
    ///
    /// A hex secret takes precedence over a passphrase.
    pub fn token_secret(&self) -> Result<TokenSecret, ConfigError> {
        if let Some(hex) = &self.signing_secret {
            return TokenSecret::from_hex(hex)
                .map_err(|e| ConfigError::invalid("invitations.signing_secret", e));
        }

        match &self.signing_passphrase {
            Some(passphrase) => Ok(TokenSecret::derive_from_passphrase(passphrase)),
            None => Err(ConfigError::invalid(
                "invitations.signing_secret",
                "no signing secret or passphrase configured",
            )),
        }
    }

    pub fn policy(&self) -> InvitationPolicy {
        InvitationPolicy {
            default_ttl: self.default_ttl,
            max_ttl: self.max_ttl,
        }
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    value
        .parse()
        .map_err(|e| ConfigError::invalid(name, e))
}

fn parse_duration(name: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value)
        .map_err(|e| ConfigError::invalid(name, e))
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: CHATNEST_<SECTION>_<KEY>
    /// Example: CHATNEST_SERVER_BIND_ADDRESS=0.0.0.0:8080
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Apply `CHATNEST_*` variables from `lookup` on top of the defaults
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_vars(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `CHATNEST_*` variables from `lookup` on top of this configuration
    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        // Server config
        if let Some(v) = lookup("CHATNEST_SERVER_BIND_ADDRESS") {
            self.server.bind_address = parse_var("CHATNEST_SERVER_BIND_ADDRESS", &v)?;
        }
        if let Some(v) = lookup("CHATNEST_SERVER_REQUEST_TIMEOUT") {
            self.server.request_timeout = parse_duration("CHATNEST_SERVER_REQUEST_TIMEOUT", &v)?;
        }

        // Store config
        if let Some(v) = lookup("CHATNEST_STORE_DATABASE_PATH") {
            self.store.database_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("CHATNEST_STORE_POOL_SIZE") {
            self.store.pool_size = parse_var("CHATNEST_STORE_POOL_SIZE", &v)?;
        }
        if let Some(v) = lookup("CHATNEST_STORE_BUSY_TIMEOUT") {
            self.store.busy_timeout = parse_duration("CHATNEST_STORE_BUSY_TIMEOUT", &v)?;
        }

        // Logging config
        if let Some(v) = lookup("CHATNEST_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("CHATNEST_LOG_JSON") {
            self.logging.json_format = parse_var("CHATNEST_LOG_JSON", &v)?;
        }

        // Invitation config
        if let Some(v) = lookup("CHATNEST_INVITATIONS_SIGNING_SECRET") {
            self.invitations.signing_secret = Some(v);
        }
        if let Some(v) = lookup("CHATNEST_INVITATIONS_SIGNING_PASSPHRASE") {
            self.invitations.signing_passphrase = Some(v);
        }
        if let Some(v) = lookup("CHATNEST_INVITATIONS_DEFAULT_TTL") {
            self.invitations.default_ttl = parse_duration("CHATNEST_INVITATIONS_DEFAULT_TTL", &v)?;
        }
        if let Some(v) = lookup("CHATNEST_INVITATIONS_MAX_TTL") {
            self.invitations.max_ttl = parse_duration("CHATNEST_INVITATIONS_MAX_TTL", &v)?;
        }

        // Notification config
        if let Some(v) = lookup("CHATNEST_NOTIFICATIONS_TRANSPORT") {
            self.notifications.transport = parse_var("CHATNEST_NOTIFICATIONS_TRANSPORT", &v)?;
        }
        if let Some(v) = lookup("CHATNEST_NOTIFICATIONS_FROM_ADDRESS") {
            self.notifications.from_address = v;
        }
        if let Some(v) = lookup("CHATNEST_NOTIFICATIONS_ACCEPT_URL") {
            self.notifications.accept_url = Some(v);
        }
        if let Some(v) = lookup("CHATNEST_NOTIFICATIONS_SMTP_HOST") {
            self.notifications.smtp.host = Some(v);
        }
        if let Some(v) = lookup("CHATNEST_NOTIFICATIONS_SMTP_PORT") {
            self.notifications.smtp.port = parse_var("CHATNEST_NOTIFICATIONS_SMTP_PORT", &v)?;
        }
        if let Some(v) = lookup("CHATNEST_NOTIFICATIONS_SMTP_USERNAME") {
            self.notifications.smtp.username = Some(v);
        }
        if let Some(v) = lookup("CHATNEST_NOTIFICATIONS_SMTP_PASSWORD") {
            self.notifications.smtp.password = Some(v);
        }
        if let Some(v) = lookup("CHATNEST_NOTIFICATIONS_SMTP_USE_TLS") {
            self.notifications.smtp.use_tls = parse_var("CHATNEST_NOTIFICATIONS_SMTP_USE_TLS", &v)?;
        }

        Ok(())
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = toml::from_str(&contents)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.request_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "request_timeout must be greater than 0".to_string(),
            ));
        }

        if self.store.pool_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "pool_size must be greater than 0".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        if self.invitations.max_ttl.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "invitations.max_ttl must be greater than 0".to_string(),
            ));
        }

        if self.invitations.default_ttl > self.invitations.max_ttl {
            return Err(ConfigError::ValidationFailed(
                "invitations.default_ttl exceeds invitations.max_ttl".to_string(),
            ));
        }

        if self.invitations.signing_secret.is_some() {
            self.invitations.token_secret()?;
        }

        if self.notifications.transport == NotificationTransport::Smtp {
            self.notifications.smtp_settings()?;
        }
        if !self.notifications.from_address.contains('@') {
            return Err(ConfigError::invalid(
                "notifications.from_address",
                "must be an email address",
            ));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;

        std::fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(())
    }
}
