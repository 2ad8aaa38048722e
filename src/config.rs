//! # Configuration Management
//!
//! Centralized configuration for the message bus client.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()` (`MESSAGEBUS_*` variables)
//!
//! ## Example
//! ```toml
//! [client]
//! host = "feeds.example.com"
//! port = 9001
//! monitor_heartbeat = true
//! max_field_length = 16777216
//!
//! [client.tls]
//! server_name = "feeds.example.com"
//! ca_cert_path = "/etc/messagebus/ca.pem"
//!
//! [logging]
//! app_name = "pricer"
//! log_level = "debug"
//! ```

use crate::core::wire::DEFAULT_MAX_FIELD_LENGTH;
use crate::error::{ProtocolError, Result};
use crate::transport::tls::TlsClientConfig;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::Level;

/// Default distributor port
pub const DEFAULT_PORT: u16 = 9001;

/// Feed carrying distributor heartbeats
pub const HEARTBEAT_FEED: &str = "__admin__";

/// Topic carrying distributor heartbeats
pub const HEARTBEAT_TOPIC: &str = "heartbeat";

/// Smallest accepted field ceiling; anything lower cannot carry a credential string
const MIN_FIELD_LENGTH: usize = 1024;

/// Top-level configuration grouping all sections
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct MessageBusConfig {
    /// Connection settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MessageBusConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables on top of defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from `MESSAGEBUS_*` environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("MESSAGEBUS_HOST") {
            self.client.host = host;
        }

        if let Ok(port) = std::env::var("MESSAGEBUS_PORT") {
            self.client.port = port.parse::<u16>().map_err(|_| {
                ProtocolError::ConfigError(format!("Invalid MESSAGEBUS_PORT: '{port}'"))
            })?;
        }

        if let Ok(flag) = std::env::var("MESSAGEBUS_MONITOR_HEARTBEAT") {
            self.client.monitor_heartbeat = parse_flag(&flag).ok_or_else(|| {
                ProtocolError::ConfigError(format!(
                    "Invalid MESSAGEBUS_MONITOR_HEARTBEAT: '{flag}'"
                ))
            })?;
        }

        if let Ok(flag) = std::env::var("MESSAGEBUS_TLS") {
            match parse_flag(&flag) {
                Some(true) => {
                    self.client.tls.get_or_insert_with(TlsSettings::default);
                }
                Some(false) => self.client.tls = None,
                None => {
                    return Err(ProtocolError::ConfigError(format!(
                        "Invalid MESSAGEBUS_TLS: '{flag}'"
                    )))
                }
            }
        }

        if let Ok(level) = std::env::var("MESSAGEBUS_LOG_LEVEL") {
            self.logging.log_level = level.parse::<Level>().map_err(|_| {
                ProtocolError::ConfigError(format!("Invalid MESSAGEBUS_LOG_LEVEL: '{level}'"))
            })?;
        }

        Ok(())
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.client.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Connection settings for one distributor
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Distributor host name or address
    pub host: String,

    /// Distributor port
    pub port: u16,

    /// Subscribe to the distributor heartbeat before entering the run loop
    pub monitor_heartbeat: bool,

    /// Ceiling for any single length prefix on inbound frames
    pub max_field_length: usize,

    /// Wrap the connection in TLS when present
    pub tls: Option<TlsSettings>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: String::from("localhost"),
            port: DEFAULT_PORT,
            monitor_heartbeat: false,
            max_field_length: DEFAULT_MAX_FIELD_LENGTH,
            tls: None,
        }
    }
}

impl ClientConfig {
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_heartbeat(mut self, monitor_heartbeat: bool) -> Self {
        self.monitor_heartbeat = monitor_heartbeat;
        self
    }

    pub fn with_tls(mut self, tls: TlsSettings) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.host.trim().is_empty() {
            errors.push("Client host cannot be empty".to_string());
        } else if self.host.contains(char::is_whitespace) {
            errors.push(format!("Invalid client host: '{}'", self.host));
        }

        if self.port == 0 {
            errors.push("Client port must be greater than 0".to_string());
        }

        if self.max_field_length < MIN_FIELD_LENGTH {
            errors.push(format!(
                "Max field length too small: {} (minimum: {MIN_FIELD_LENGTH} bytes)",
                self.max_field_length
            ));
        } else if self.max_field_length > i32::MAX as usize {
            errors.push(format!(
                "Max field length too large: {} (maximum: {} bytes)",
                self.max_field_length,
                i32::MAX
            ));
        }

        if let Some(tls) = &self.tls {
            errors.extend(tls.validate());
        }

        errors
    }
}

/// Serializable TLS options, turned into a [`TlsClientConfig`] at connect time
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct TlsSettings {
    /// Name to verify the server certificate against (defaults to the host)
    pub server_name: Option<String>,

    /// PEM bundle of trusted roots (defaults to the platform store)
    pub ca_cert_path: Option<String>,

    /// PEM client certificate for mutual TLS
    pub client_cert_path: Option<String>,

    /// PKCS8 PEM client key for mutual TLS
    pub client_key_path: Option<String>,

    /// Skip certificate verification (development only)
    pub insecure: bool,

    /// Hex SHA-256 fingerprint the server certificate must match
    pub pinned_cert_sha256: Option<String>,
}

impl TlsSettings {
    /// Validate TLS settings
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.client_cert_path.is_some() != self.client_key_path.is_some() {
            errors.push(
                "client_cert_path and client_key_path must be set together".to_string(),
            );
        }

        for (name, path) in [
            ("ca_cert_path", &self.ca_cert_path),
            ("client_cert_path", &self.client_cert_path),
            ("client_key_path", &self.client_key_path),
        ] {
            if let Some(path) = path {
                if !Path::new(path).exists() {
                    errors.push(format!("{name} does not exist: {path}"));
                }
            }
        }

        if let Some(pin) = &self.pinned_cert_sha256 {
            match hex::decode(pin) {
                Ok(bytes) if bytes.len() == 32 => {}
                _ => errors.push(format!(
                    "pinned_cert_sha256 must be 64 hex characters, got '{pin}'"
                )),
            }
        }

        if self.insecure && self.pinned_cert_sha256.is_none() {
            errors.push(
                "WARNING: TLS verification is disabled - not recommended for production"
                    .to_string(),
            );
        }

        errors
    }

    /// Build the rustls-facing client configuration for `host`
    pub fn to_client_config(&self, host: &str) -> Result<TlsClientConfig> {
        let server_name = self.server_name.as_deref().unwrap_or(host);
        let mut config = TlsClientConfig::new(server_name);

        if let Some(ca) = &self.ca_cert_path {
            config = config.with_ca_file(ca);
        }
        if let (Some(cert), Some(key)) = (&self.client_cert_path, &self.client_key_path) {
            config = config.with_client_certificate(cert.as_str(), key.as_str());
        }
        if let Some(pin) = &self.pinned_cert_sha256 {
            let hash = hex::decode(pin).map_err(|e| {
                ProtocolError::ConfigError(format!("Invalid pinned_cert_sha256: {e}"))
            })?;
            config = config.with_pinned_cert_hash(hash);
        }
        if self.insecure {
            config = config.insecure();
        }

        Ok(config)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("messagebus-client"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
