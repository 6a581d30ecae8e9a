//! # Configuration Management
//!
//! Centralized configuration for the DHT protocol core.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()`
//!
//! ## Security Considerations
//! - The maximum message size bounds every frame read from a peer; frames
//!   above it are skipped without being buffered
//! - `max_connections` bounds the number of concurrent pipelines

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

/// Protocol identifier negotiated by the transport before streams reach us.
///
/// Envelopes are bincode, not the libp2p protobuf schema, so this must not be
/// `/ipfs/kad/1.0.0`: peers speaking that protocol could not be decoded.
pub const PROTOCOL_ID: &str = "/kad-protocol/1.0.0";

/// Max allowed frame payload size (2 MiB)
pub const MAX_MESSAGE_SIZE: usize = 2 * 1024 * 1024;

/// Default bound on concurrently served connections
pub const DEFAULT_MAX_CONNECTIONS: usize = 1000;

/// Default grace period for pipelines during shutdown
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct KadConfig {
    /// Wire protocol settings
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// Connection-serving settings
    #[serde(default)]
    pub server: ServerConfig,
}

impl KadConfig {
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

    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(id) = std::env::var("KAD_PROTOCOL_ID") {
            config.protocol.protocol_id = id;
        }

        if let Ok(size) = std::env::var("KAD_PROTOCOL_MAX_MESSAGE_SIZE") {
            config.protocol.max_message_size = size.parse::<usize>().map_err(|e| {
                ProtocolError::ConfigError(format!("Invalid KAD_PROTOCOL_MAX_MESSAGE_SIZE: {e}"))
            })?;
        }

        if let Ok(max) = std::env::var("KAD_PROTOCOL_MAX_CONNECTIONS") {
            config.server.max_connections = max.parse::<usize>().map_err(|e| {
                ProtocolError::ConfigError(format!("Invalid KAD_PROTOCOL_MAX_CONNECTIONS: {e}"))
            })?;
        }

        if let Ok(timeout) = std::env::var("KAD_PROTOCOL_SHUTDOWN_TIMEOUT_MS") {
            let millis = timeout.parse::<u64>().map_err(|e| {
                ProtocolError::ConfigError(format!("Invalid KAD_PROTOCOL_SHUTDOWN_TIMEOUT_MS: {e}"))
            })?;
            config.server.shutdown_timeout = Duration::from_millis(millis);
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
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

    /// Validate the configuration
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = self.protocol.validate();
        errors.extend(self.server.validate());
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

/// Wire protocol configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProtocolConfig {
    /// Protocol identifier (e.g. "/kad-protocol/1.0.0")
    pub protocol_id: String,

    /// Largest frame payload accepted from or sent to a peer
    pub max_message_size: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            protocol_id: PROTOCOL_ID.to_string(),
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

impl ProtocolConfig {
    /// Validate protocol configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.protocol_id.is_empty() {
            errors.push("Protocol id cannot be empty".to_string());
        } else if !self.protocol_id.starts_with('/') {
            errors.push(format!(
                "Invalid protocol id: '{}' (expected a path such as '/kad-protocol/1.0.0')",
                self.protocol_id
            ));
        }

        if self.max_message_size < 1024 {
            errors.push("Max message size too small (minimum: 1 KB)".to_string());
        } else if self.max_message_size > 64 * 1024 * 1024 {
            errors.push(format!(
                "Max message size too large: {} bytes (maximum: 64 MB)",
                self.max_message_size
            ));
        }

        errors
    }
}

/// Connection-serving configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Maximum number of concurrent connections
    pub max_connections: usize,

    /// How long shutdown waits for open pipelines before aborting them
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 100_000 {
            errors.push(format!(
                "Max connections very high: {} (maximum: 100,000)",
                self.max_connections
            ));
        }

        if self.shutdown_timeout.as_secs() < 1 {
            errors.push("Shutdown timeout too short (minimum: 1s)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
