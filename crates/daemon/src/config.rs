//! Configuration management for the FileVault daemon.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/filevault/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("auth.username must not be empty")]
    EmptyUsername,

    #[error("auth.password must not be empty; set it in the config file or FILEVAULT_PASSWORD")]
    EmptyPassword,

    #[error("auth.username must not contain ':'")]
    InvalidUsername,

    #[error("max_upload_size must be greater than 0, got {0}")]
    InvalidMaxUploadSize(u64),

    #[error("max_request_size ({request}) must not be smaller than max_upload_size ({upload})")]
    MaxRequestSizeTooSmall { request: u64, upload: u64 },

    #[error("{field} must be greater than 0")]
    ZeroPageSize { field: &'static str },

    #[error("default_page_size ({default}) must not exceed max_page_size ({max})")]
    DefaultPageSizeTooLarge { default: usize, max: usize },

    #[error("allowed extension must start with '.' or be \"*\", got {0:?}")]
    InvalidExtension(String),

    #[error("vault.root must not be empty")]
    EmptyRoot,
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Length of passwords produced by `filevault-daemon init`.
pub const GENERATED_PASSWORD_LENGTH: usize = 24;

/// Main configuration structure for the FileVault daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// HTTP listener configuration.
    pub server: ServerConfig,

    /// Served directory and upload rules.
    pub vault: VaultConfig,

    /// Shared Basic-auth credential.
    pub auth: AuthConfig,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Directory for daily-rolling log files. Logs go to stderr only when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind_address: String,

    /// Port to listen on. 0 picks a free port.
    pub port: u16,

    /// Directory holding the browser UI.
    pub static_dir: PathBuf,
}

/// Served directory and upload rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VaultConfig {
    /// Root directory exposed over HTTP. Created at startup if absent.
    pub root: PathBuf,

    /// Extensions accepted for upload, with the dot. `"*"` accepts all.
    /// An empty list rejects every upload.
    pub allowed_extensions: Vec<String>,

    /// Maximum size of a single uploaded file in bytes (default: 100MB).
    pub max_upload_size: u64,

    /// Maximum size of a whole upload request body in bytes (default: 1GB).
    pub max_request_size: u64,

    /// Page size used when a listing request does not name one.
    pub default_page_size: usize,

    /// Largest page size a client may request.
    pub max_page_size: usize,
}

/// Shared Basic-auth credential.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    /// Username expected in the `Authorization` header.
    pub username: String,

    /// Password expected in the `Authorization` header.
    pub password: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
            static_dir: PathBuf::from("wwwroot"),
        }
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("files"),
            allowed_extensions: [
                ".pdf", ".txt", ".md", ".csv", ".png", ".jpg", ".jpeg", ".gif", ".zip", ".docx",
                ".xlsx",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            max_upload_size: 100 * 1024 * 1024,   // 100MB
            max_request_size: 1024 * 1024 * 1024, // 1GB
            default_page_size: 50,
            max_page_size: 1000,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: String::new(),
        }
    }
}

impl AuthConfig {
    /// Default username with a freshly generated random password.
    pub fn generated() -> Self {
        let password = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(GENERATED_PASSWORD_LENGTH)
            .map(char::from)
            .collect();
        Self {
            password,
            ..Self::default()
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("filevault")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Empty values are ignored. Supported variables:
    /// - FILEVAULT_ROOT: Override the vault root directory
    /// - FILEVAULT_PORT: Override the listen port
    /// - FILEVAULT_USERNAME: Override the Basic-auth username
    /// - FILEVAULT_PASSWORD: Override the Basic-auth password
    /// - FILEVAULT_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Some(root) = env_value("FILEVAULT_ROOT") {
            tracing::info!("Overriding vault root from environment: {}", root);
            self.vault.root = PathBuf::from(root);
        }

        if let Some(port) = env_value("FILEVAULT_PORT") {
            match port.parse::<u16>() {
                Ok(port) => {
                    tracing::info!("Overriding port from environment: {}", port);
                    self.server.port = port;
                }
                Err(_) => {
                    tracing::warn!("Ignoring invalid FILEVAULT_PORT value: {}", port);
                }
            }
        }

        if let Some(username) = env_value("FILEVAULT_USERNAME") {
            tracing::info!("Overriding username from environment");
            self.auth.username = username;
        }

        if let Some(password) = env_value("FILEVAULT_PASSWORD") {
            tracing::info!("Overriding password from environment");
            self.auth.password = password;
        }

        if let Some(level) = env_value("FILEVAULT_LOG_LEVEL") {
            tracing::info!("Overriding log_level from environment: {}", level);
            self.daemon.log_level = level;
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        if self.auth.username.is_empty() {
            return Err(ConfigError::EmptyUsername);
        }
        // Basic auth splits on the first ':'
        if self.auth.username.contains(':') {
            return Err(ConfigError::InvalidUsername);
        }
        if self.auth.password.is_empty() {
            return Err(ConfigError::EmptyPassword);
        }

        if self.vault.root.as_os_str().is_empty() {
            return Err(ConfigError::EmptyRoot);
        }

        if self.vault.max_upload_size == 0 {
            return Err(ConfigError::InvalidMaxUploadSize(self.vault.max_upload_size));
        }
        if self.vault.max_request_size < self.vault.max_upload_size {
            return Err(ConfigError::MaxRequestSizeTooSmall {
                request: self.vault.max_request_size,
                upload: self.vault.max_upload_size,
            });
        }

        if self.vault.default_page_size == 0 {
            return Err(ConfigError::ZeroPageSize {
                field: "default_page_size",
            });
        }
        if self.vault.max_page_size == 0 {
            return Err(ConfigError::ZeroPageSize {
                field: "max_page_size",
            });
        }
        if self.vault.default_page_size > self.vault.max_page_size {
            return Err(ConfigError::DefaultPageSizeTooLarge {
                default: self.vault.default_page_size,
                max: self.vault.max_page_size,
            });
        }

        for ext in &self.vault.allowed_extensions {
            let valid = ext == "*"
                || (ext.len() > 1
                    && ext.starts_with('.')
                    && !ext[1..].contains(['.', '/', '\\']));
            if !valid {
                return Err(ConfigError::InvalidExtension(ext.clone()));
            }
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist. The file holds the
    /// password, so on unix it is readable by the owner only.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        write_private(path, contents.as_bytes())
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies when the file is created
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    fs::write(path, contents)
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
